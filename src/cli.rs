use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::services::DEFAULT_SERVICE;

#[derive(Debug, Parser)]
#[command(name = "xemst", version, about = "Client for remote steganography workers")]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

/// Connection selection shared by the run commands.
#[derive(Debug, Args)]
pub struct ConnectionArgs {
    /// Worker service id (`mp3stego` or `stegcracker`).
    #[arg(long, default_value = DEFAULT_SERVICE)]
    pub service: String,

    /// Worker endpoint URL; falls back to the remembered connection.
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Worker bearer token; falls back to the remembered connection.
    #[arg(long)]
    pub token: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Verify a worker endpoint and remember the connection.
    Connect {
        #[arg(long, default_value = DEFAULT_SERVICE)]
        service: String,

        #[arg(long)]
        endpoint: String,

        #[arg(long)]
        token: String,

        /// Verify only; do not persist the endpoint and token.
        #[arg(long)]
        no_remember: bool,
    },

    /// Hide a message inside a cover file.
    Encode {
        #[command(flatten)]
        connection: ConnectionArgs,

        /// Cover file to embed into.
        #[arg(long)]
        file: PathBuf,

        /// Passphrase protecting the hidden message.
        #[arg(long, default_value = "")]
        secret: String,

        /// Text to hide inside the file.
        #[arg(long)]
        text: String,
    },

    /// Extract a hidden message with a known passphrase.
    Decode {
        #[command(flatten)]
        connection: ConnectionArgs,

        #[arg(long)]
        file: PathBuf,

        #[arg(long, default_value = "")]
        secret: String,
    },

    /// Recover a passphrase with the worker's wordlist attack.
    Bruteforce {
        #[command(flatten)]
        connection: ConnectionArgs,

        #[arg(long)]
        file: PathBuf,

        /// Wordlist file; the worker falls back to its bundled rockyou.txt.
        #[arg(long)]
        wordlist: Option<PathBuf>,

        /// Candidates tried concurrently per chunk (clamped to 1-50).
        #[arg(long, default_value_t = 10)]
        chunk_size: u32,

        /// Discard candidates whose recovered text looks like gibberish.
        #[arg(long)]
        check_gibberish: bool,
    },

    /// Clear the local access session.
    Logout,
}
