//! CLI error type and "caused by:" chain rendering.

use crate::config::ConfigError;
use intcode_vm::{ImageError, PipelineError, VmError};
use std::error::Error as StdError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("cannot load program image")]
    Image(#[from] ImageError),
    #[error("cannot load configuration")]
    Config(#[from] ConfigError),
    #[error("machine faulted")]
    Vm(#[from] VmError),
    #[error("pipeline failed")]
    Pipeline(#[from] PipelineError),
    #[error("i/o error")]
    Io(#[from] std::io::Error),
    #[error("cannot encode output as json")]
    Json(#[from] serde_json::Error),
    #[error("invalid --poke {0:?}: expected ADDR=VALUE")]
    BadPoke(String),
    #[error("invalid input value {0:?}")]
    BadInput(String),
    #[error("program wants more input at address {cursor}; queue it with --input or pass --interactive")]
    InputExhausted { cursor: usize },
    #[error("interactive input ended while the machine was waiting")]
    InputClosed,
}

/// A primary message plus the messages of every underlying source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorChain {
    pub primary: String,
    pub causes: Vec<String>,
}

impl ErrorChain {
    /// Collect `err` and its `source()` chain.
    ///
    /// A cause whose text is already part of the message above it is
    /// skipped, since several errors embed their source in `Display`.
    pub fn from_error(err: &(dyn StdError + 'static)) -> Self {
        let primary = err.to_string();
        let mut causes: Vec<String> = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            let msg = cause.to_string();
            let above = causes.last().unwrap_or(&primary);
            if !above.contains(&msg) {
                causes.push(msg);
            }
            source = cause.source();
        }
        Self { primary, causes }
    }

    /// Render without the leading `error:` tag:
    ///
    /// ```text
    /// <primary message>
    ///   caused by: <cause 1>
    ///   caused by: <cause 2>
    /// ```
    pub fn format_body(&self) -> String {
        let mut out = self.primary.clone();
        for cause in &self.causes {
            out.push_str("\n  caused by: ");
            out.push_str(cause);
        }
        out
    }
}
