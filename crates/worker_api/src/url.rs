use url::Url;

use crate::error::WorkerApiError;

/// Normalize a user-supplied worker endpoint to a usable base URL.
///
/// Normalization rules:
/// 1) trim surrounding whitespace
/// 2) upgrade `http://` to `https://`
/// 3) prepend `https://` when no scheme is present
/// 4) strip trailing slashes
pub fn normalize_worker_url(input: &str) -> String {
    let trimmed = input.trim();
    let with_scheme = if let Some(rest) = trimmed.strip_prefix("http://") {
        format!("https://{rest}")
    } else if trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    with_scheme.trim_end_matches('/').to_string()
}

pub fn commands_url(base_url: &str) -> String {
    format!("{}/api/commands", base_url.trim_end_matches('/'))
}

pub fn health_url(base_url: &str) -> String {
    format!("{}/api/health", base_url.trim_end_matches('/'))
}

/// Build the SSE subscription URL for one command.
///
/// The token rides in the query string because the browser client the worker
/// was built for cannot attach headers to an event source; the worker accepts
/// either form.
pub fn stream_url(base_url: &str, command_id: &str, token: &str) -> Result<String, WorkerApiError> {
    let raw = format!(
        "{}/api/commands/{command_id}/stream",
        base_url.trim_end_matches('/')
    );
    let mut url = parse_url(&raw)?;
    url.query_pairs_mut().append_pair("token", token);
    Ok(url.into())
}

/// Build the authenticated artifact URL, percent-encoding the filename.
pub fn artifact_url(
    base_url: &str,
    command_id: &str,
    file_name: &str,
) -> Result<String, WorkerApiError> {
    let raw = format!("{}/uploads", base_url.trim_end_matches('/'));
    let mut url = parse_url(&raw)?;
    url.path_segments_mut()
        .map_err(|()| WorkerApiError::InvalidBaseUrl(base_url.to_string()))?
        .push(command_id)
        .push(file_name);
    Ok(url.into())
}

fn parse_url(raw: &str) -> Result<Url, WorkerApiError> {
    Url::parse(raw).map_err(|error| WorkerApiError::InvalidBaseUrl(format!("{raw}: {error}")))
}
