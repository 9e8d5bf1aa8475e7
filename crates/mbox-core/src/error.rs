//! Error types for mbox-core

use mbox_provider::ProviderError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Instance not found: {0}")]
    NotFound(String),

    #[error("Instance already exists: {0}")]
    AlreadyExists(String),

    #[error("No available ports in range {start}-{end}")]
    PortExhausted { start: u16, end: u16 },

    #[error("Container runtime failed to {step} {instance}: {source}")]
    Runtime {
        step: &'static str,
        instance: String,
        #[source]
        source: ProviderError,
    },

    #[error("Command failed in {}{}: {}", .instance, exit_suffix(.exit_code), .message)]
    Exec {
        instance: String,
        exit_code: Option<i64>,
        message: String,
    },

    #[error("Failed to {} {}: {}", .action, .path.display(), .reason)]
    Provision {
        action: &'static str,
        path: PathBuf,
        reason: String,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] mbox_config::ConfigError),
}

fn exit_suffix(exit_code: &Option<i64>) -> String {
    match exit_code {
        Some(code) => format!(" (exit code {})", code),
        None => String::new(),
    }
}

/// Coarse, HTTP-style classification of a core error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    BadRequest,
    NotFound,
    Conflict,
    Internal,
}

impl StatusClass {
    pub fn http_status(self) -> u16 {
        match self {
            Self::BadRequest => 400,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::Internal => 500,
        }
    }
}

impl CoreError {
    pub(crate) fn runtime(step: &'static str, instance: &str, source: ProviderError) -> Self {
        Self::Runtime {
            step,
            instance: instance.to_string(),
            source,
        }
    }

    pub(crate) fn exec(instance: &str, exit_code: Option<i64>, message: impl Into<String>) -> Self {
        Self::Exec {
            instance: instance.to_string(),
            exit_code,
            message: message.into(),
        }
    }

    pub(crate) fn provision(
        action: &'static str,
        path: impl Into<PathBuf>,
        reason: impl ToString,
    ) -> Self {
        Self::Provision {
            action,
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn status_class(&self) -> StatusClass {
        match self {
            Self::InvalidArgument(_) => StatusClass::BadRequest,
            Self::NotFound(_) => StatusClass::NotFound,
            Self::AlreadyExists(_) => StatusClass::Conflict,
            Self::PortExhausted { .. }
            | Self::Runtime { .. }
            | Self::Exec { .. }
            | Self::Provision { .. }
            | Self::Config(_) => StatusClass::Internal,
        }
    }

    pub fn http_status(&self) -> u16 {
        self.status_class().http_status()
    }

    /// Exit code of the failed console command, when it ran at all
    pub fn exit_code(&self) -> Option<i64> {
        match self {
            Self::Exec { exit_code, .. } => *exit_code,
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
