use std::fmt;

use worker_api::{CommandKind, CommandParams, CommandRequest, FileUpload};

/// Bruteforce concurrency bounds accepted by the worker.
pub const MIN_CHUNK_SIZE: u32 = 1;
pub const MAX_CHUNK_SIZE: u32 = 50;

/// Local precondition failure; never reaches the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    message: String,
}

impl ValidationError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ValidationError {}

/// A fully-typed submission as collected from the host's form.
///
/// The cover file is optional here so missing-file submissions can be
/// rejected locally instead of at form-construction time.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitRequest {
    Encode {
        cover: Option<FileUpload>,
        secret: String,
        text: String,
    },
    Decode {
        cover: Option<FileUpload>,
        secret: String,
    },
    Bruteforce {
        cover: Option<FileUpload>,
        wordlist: Option<FileUpload>,
        chunk_size: u32,
        check_gibberish: bool,
    },
}

impl SubmitRequest {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::Encode { .. } => CommandKind::Encode,
            Self::Decode { .. } => CommandKind::Decode,
            Self::Bruteforce { .. } => CommandKind::Bruteforce,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let cover = match self {
            Self::Encode { cover, text, .. } => {
                if text.trim().is_empty() {
                    return Err(ValidationError::new("a hidden message is required"));
                }
                cover
            }
            Self::Decode { cover, .. } | Self::Bruteforce { cover, .. } => cover,
        };

        if cover.is_none() {
            return Err(ValidationError::new("a cover file is required"));
        }

        Ok(())
    }

    /// Validate and build the wire request.
    pub fn into_command_request(self) -> Result<CommandRequest, ValidationError> {
        self.validate()?;

        Ok(match self {
            Self::Encode {
                cover,
                secret,
                text,
            } => CommandRequest::new(
                CommandKind::Encode,
                CommandParams::Encode { secret, text },
                expect_cover(cover)?,
            ),
            Self::Decode { cover, secret } => CommandRequest::new(
                CommandKind::Decode,
                CommandParams::Decode { secret },
                expect_cover(cover)?,
            ),
            Self::Bruteforce {
                cover,
                wordlist,
                chunk_size,
                check_gibberish,
            } => {
                let request = CommandRequest::new(
                    CommandKind::Bruteforce,
                    CommandParams::Bruteforce {
                        chunk_size: chunk_size.clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE),
                        check_gibberish,
                    },
                    expect_cover(cover)?,
                );
                match wordlist {
                    Some(wordlist) => request.with_wordlist(wordlist),
                    None => request,
                }
            }
        })
    }
}

fn expect_cover(cover: Option<FileUpload>) -> Result<FileUpload, ValidationError> {
    cover.ok_or_else(|| ValidationError::new("a cover file is required"))
}
