use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type HalResult<T> = Result<T, HalError>;
pub type ImgResult<T> = Result<T, ImgError>;

/// Failures of a single external process invocation.
#[derive(Error, Debug)]
pub enum HalError {
    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Command failed: {program} (exit={code:?}): {output}")]
    CommandFailed {
        program: String,
        code: Option<i32>,
        output: String,
    },

    #[error("Command timed out: {program} after {timeout_secs}s")]
    CommandTimeout { program: String, timeout_secs: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl HalError {
    /// Exit code of the failed command, if it ran to completion.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            HalError::CommandFailed { code, .. } => *code,
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum AttachmentError {
    #[error("kpartx could not attach {}: {source}", image.display())]
    Tool {
        image: PathBuf,
        #[source]
        source: HalError,
    },

    #[error("kpartx output for {} contains no partition mapping", image.display())]
    NoMapping { image: PathBuf },
}

#[derive(Error, Debug)]
#[error("Failed to mount {device} on {}: {cause}", target.display())]
pub struct MountError {
    pub device: String,
    pub target: PathBuf,
    #[source]
    pub cause: HalError,
}

impl MountError {
    pub fn exit_code(&self) -> Option<i32> {
        self.cause.exit_code()
    }
}

#[derive(Error, Debug)]
pub enum ImgError {
    #[error(transparent)]
    Attachment(#[from] AttachmentError),

    #[error(transparent)]
    Mount(#[from] MountError),

    #[error(transparent)]
    Command(#[from] HalError),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("No command given")]
    EmptyCommand,

    #[error("Must be run as root")]
    NotRoot,

    #[error("Interrupted")]
    Interrupted,
}

impl ImgError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ImgError::Io {
            path: path.into(),
            source,
        }
    }

    /// Exit code reported by the external tool behind this error, if any.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ImgError::Attachment(AttachmentError::Tool { source, .. }) => source.exit_code(),
            ImgError::Mount(err) => err.exit_code(),
            ImgError::Command(err) => err.exit_code(),
            _ => None,
        }
    }
}
