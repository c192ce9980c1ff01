use std::io;
use std::path::Path;

use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};

use crate::error::WorkerApiError;

/// The three command kinds the worker executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    Encode,
    Decode,
    Bruteforce,
}

impl CommandKind {
    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "encode" => Self::Encode,
            "decode" => Self::Decode,
            "bruteforce" => Self::Bruteforce,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Encode => "encode",
            Self::Decode => "decode",
            Self::Bruteforce => "bruteforce",
        }
    }
}

/// Kind-specific parameter object serialized into the `params` form field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandParams {
    Encode { secret: String, text: String },
    Decode { secret: String },
    Bruteforce { chunk_size: u32, check_gibberish: bool },
}

/// In-memory file carried in the multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl FileUpload {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    /// Read a file from disk, keeping only its final path component as name.
    pub fn from_path(path: &Path) -> io::Result<Self> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| io::Error::other(format!("unusable file name: {}", path.display())))?
            .to_string();
        let bytes = std::fs::read(path)?;
        Ok(Self { file_name, bytes })
    }
}

/// One fully-specified command submission.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandRequest {
    pub kind: CommandKind,
    pub params: CommandParams,
    pub file: FileUpload,
    pub wordlist: Option<FileUpload>,
}

impl CommandRequest {
    pub fn new(kind: CommandKind, params: CommandParams, file: FileUpload) -> Self {
        Self {
            kind,
            params,
            file,
            wordlist: None,
        }
    }

    pub fn with_wordlist(mut self, wordlist: FileUpload) -> Self {
        self.wordlist = Some(wordlist);
        self
    }

    pub fn params_json(&self) -> Result<String, WorkerApiError> {
        serde_json::to_string(&self.params).map_err(WorkerApiError::from)
    }

    /// Build the multipart body: `type`, `params`, `file`, optional `wordlist`.
    pub(crate) fn to_form(&self) -> Result<Form, WorkerApiError> {
        let mut form = Form::new()
            .text("type", self.kind.as_str())
            .text("params", self.params_json()?)
            .part(
                "file",
                Part::bytes(self.file.bytes.clone()).file_name(self.file.file_name.clone()),
            );

        if let Some(wordlist) = &self.wordlist {
            form = form.part(
                "wordlist",
                Part::bytes(wordlist.bytes.clone()).file_name(wordlist.file_name.clone()),
            );
        }

        Ok(form)
    }
}
