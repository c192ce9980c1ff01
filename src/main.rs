mod access;
mod cli;
mod services;
mod settings;

use std::io::{self, Write as _};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use command_runner::{
    CommandLifecycle, HttpWorkerTransport, LifecycleState, LogDelta, LogEntry, SubmitRequest,
    TerminalKind, WorkerTransport,
};
use worker_api::{
    normalize_worker_url, split_brute_success, FileUpload, LogKind, WorkerApiClient,
    WorkerApiConfig,
};

use crate::cli::{Cli, CliCommand, ConnectionArgs};
use crate::settings::{settings_path, ConnectionSettings, Settings};

/// Rendering cadence for the live log.
const FRAME_INTERVAL: Duration = Duration::from_millis(50);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

fn main() -> io::Result<()> {
    let cli = Cli::parse();
    let path = settings_path().map_err(io::Error::other)?;
    let mut settings = Settings::load(&path).map_err(io::Error::other)?;

    match cli.command {
        CliCommand::Logout => logout(&mut settings, &path),
        CliCommand::Connect {
            service,
            endpoint,
            token,
            no_remember,
        } => {
            ensure_session(&mut settings, &path)?;
            connect(
                &mut settings,
                &path,
                &service,
                &endpoint,
                &token,
                !no_remember,
            )
        }
        CliCommand::Encode {
            connection,
            file,
            secret,
            text,
        } => {
            ensure_session(&mut settings, &path)?;
            let cover = read_upload(&file)?;
            note_unusual_cover(&connection.service, &cover);
            run_command(
                &settings,
                &connection,
                SubmitRequest::Encode {
                    cover: Some(cover),
                    secret,
                    text,
                },
            )
        }
        CliCommand::Decode {
            connection,
            file,
            secret,
        } => {
            ensure_session(&mut settings, &path)?;
            let cover = read_upload(&file)?;
            note_unusual_cover(&connection.service, &cover);
            run_command(
                &settings,
                &connection,
                SubmitRequest::Decode {
                    cover: Some(cover),
                    secret,
                },
            )
        }
        CliCommand::Bruteforce {
            connection,
            file,
            wordlist,
            chunk_size,
            check_gibberish,
        } => {
            ensure_session(&mut settings, &path)?;
            let cover = read_upload(&file)?;
            note_unusual_cover(&connection.service, &cover);
            let wordlist = wordlist.as_deref().map(read_upload).transpose()?;
            run_command(
                &settings,
                &connection,
                SubmitRequest::Bruteforce {
                    cover: Some(cover),
                    wordlist,
                    chunk_size,
                    check_gibberish,
                },
            )
        }
    }
}

/// Prompt for the PIN unless a session token is already stored.
fn ensure_session(settings: &mut Settings, path: &Path) -> io::Result<()> {
    if settings.session_token.is_some() {
        return Ok(());
    }

    print!("PIN: ");
    io::stdout().flush()?;
    let mut pin = String::new();
    io::stdin().read_line(&mut pin)?;

    access::verify_pin(&pin, &access::expected_pin_hash()).map_err(io::Error::other)?;
    settings.session_token = Some(access::issue_session_token());
    settings.save(path).map_err(io::Error::other)?;
    println!("Access granted.");
    Ok(())
}

fn logout(settings: &mut Settings, path: &Path) -> io::Result<()> {
    settings.session_token = None;
    settings.save(path).map_err(io::Error::other)?;
    println!("Session cleared.");
    Ok(())
}

fn connect(
    settings: &mut Settings,
    path: &Path,
    service: &str,
    endpoint: &str,
    token: &str,
    remember: bool,
) -> io::Result<()> {
    let profile = services::find(service)
        .ok_or_else(|| io::Error::other(format!("unknown service '{service}'")))?;
    let endpoint = normalize_worker_url(endpoint);
    let token = token.trim().to_string();

    let client = WorkerApiClient::new(
        WorkerApiConfig::new(endpoint.clone(), token.clone()).with_timeout(CONNECT_TIMEOUT),
    )
    .map_err(io::Error::other)?;
    let report = HttpWorkerTransport::new(client)
        .health()
        .map_err(io::Error::other)?;

    let detail = report
        .message
        .map(|message| format!(": {message}"))
        .unwrap_or_default();
    println!("{} is ready{detail}", profile.title);

    settings.remember_connection(
        service,
        ConnectionSettings {
            endpoint,
            token,
            remember,
        },
    );
    settings.save(path).map_err(io::Error::other)?;
    Ok(())
}

fn read_upload(path: &Path) -> io::Result<FileUpload> {
    FileUpload::from_path(path)
}

/// Non-blocking heads-up when the cover type looks wrong for the service;
/// the worker stays the authority on what it accepts.
fn note_unusual_cover(service: &str, cover: &FileUpload) {
    let Some(profile) = services::find(service) else {
        return;
    };
    if !profile.accepts(&cover.file_name) {
        eprintln!(
            "note: {} usually expects {} covers",
            profile.title,
            profile.cover_extensions.join("/")
        );
    }
}

fn resolve_connection(
    settings: &Settings,
    connection: &ConnectionArgs,
) -> io::Result<(String, String)> {
    let remembered = settings.connection(&connection.service);
    let endpoint = connection
        .endpoint
        .clone()
        .or_else(|| {
            remembered
                .map(|c| c.endpoint.clone())
                .filter(|endpoint| !endpoint.is_empty())
        })
        .ok_or_else(|| {
            io::Error::other("no worker endpoint; run `xemst connect` or pass --endpoint")
        })?;
    let token = connection
        .token
        .clone()
        .or_else(|| {
            remembered
                .map(|c| c.token.clone())
                .filter(|token| !token.is_empty())
        })
        .ok_or_else(|| io::Error::other("no worker token; run `xemst connect` or pass --token"))?;

    Ok((normalize_worker_url(&endpoint), token))
}

/// Drive one command to its terminal state, rendering the log per frame.
fn run_command(
    settings: &Settings,
    connection: &ConnectionArgs,
    request: SubmitRequest,
) -> io::Result<()> {
    let (endpoint, token) = resolve_connection(settings, connection)?;
    let client = WorkerApiClient::new(WorkerApiConfig::new(endpoint, token))
        .map_err(io::Error::other)?;
    let transport: Arc<dyn WorkerTransport> = Arc::new(HttpWorkerTransport::new(client));
    let mut lifecycle = CommandLifecycle::new(transport);
    let mut renderer = LogRenderer::default();

    lifecycle.submit(request);
    loop {
        for delta in lifecycle.tick() {
            renderer.render(&delta);
        }
        if !lifecycle.is_busy() && !lifecycle.has_pending() {
            break;
        }
        std::thread::sleep(FRAME_INTERVAL);
    }

    if lifecycle.state() == LifecycleState::Terminal(TerminalKind::Success)
        && lifecycle.result().is_some_and(|result| result.has_artifact)
    {
        let dest = std::env::current_dir()?;
        lifecycle.download_artifact(&dest);
        for delta in lifecycle.tick() {
            renderer.render(&delta);
        }
    }
    renderer.finish();

    match lifecycle.state() {
        LifecycleState::Terminal(TerminalKind::Success) => Ok(()),
        LifecycleState::Terminal(TerminalKind::Failure) => {
            Err(io::Error::other("command failed"))
        }
        LifecycleState::Terminal(TerminalKind::Unresolved) => {
            Err(io::Error::other("stream ended without a result"))
        }
        _ => Err(io::Error::other("command did not complete")),
    }
}

/// Prints visible-log deltas; coalesced progress updates overwrite their
/// line in place instead of scrolling.
#[derive(Debug, Default)]
struct LogRenderer {
    open_line: bool,
}

impl LogRenderer {
    fn render(&mut self, delta: &LogDelta) {
        match delta {
            LogDelta::Append(entry) => {
                if self.open_line {
                    println!();
                    self.open_line = false;
                }
                if entry.is_collapsible() {
                    print!("{}", format_entry(entry));
                    let _ = io::stdout().flush();
                    self.open_line = true;
                } else {
                    println!("{}", format_entry(entry));
                }
            }
            LogDelta::ReplaceTail(entry) => {
                print!("\r\u{1b}[2K{}", format_entry(entry));
                let _ = io::stdout().flush();
                self.open_line = true;
            }
        }
    }

    fn finish(&mut self) {
        if self.open_line {
            println!();
            self.open_line = false;
        }
    }
}

fn format_entry(entry: &LogEntry) -> String {
    match entry.kind {
        LogKind::BruteSuccess => {
            let parts = split_brute_success(&entry.message);
            format!(
                "{} > {} [ok] [{}]\n        {}",
                entry.time, parts.candidate, parts.context, parts.content
            )
        }
        LogKind::BruteFail => format!("{} > {} [x]", entry.time, entry.message),
        _ => format!("{} > {}", entry.time, entry.message),
    }
}
