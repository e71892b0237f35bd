//! Error types you might see while installing or launching a kernel

use std::{fmt, path::PathBuf};
use thiserror::Error;

/// Process exit status reported by the command line tool for each class of
/// failure
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ExitCode {
    /// everything worked
    Success,
    /// a connection file or kernel descriptor could not be read or written
    Descriptor,
    /// the container engine could not be reached
    Engine,
    /// the container engine was reachable but refused to run the kernel
    Launch,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        match self {
            ExitCode::Success => 0,
            ExitCode::Descriptor => 2,
            ExitCode::Engine => 3,
            ExitCode::Launch => 4,
        }
    }
}

/// Errors reading, validating, or writing a kernel connection file
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// connection file could not be read
    #[error("can't read connection file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// connection file is not valid json
    #[error("connection file {path:?} is not valid json: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// connection file must contain a json object at the top level
    #[error("connection file {path:?} does not contain a json object")]
    NotAnObject { path: PathBuf },

    /// a port field holds something other than a port number
    #[error("connection field {field:?} is not a valid port number: {value}")]
    InvalidPort {
        field: String,
        value: serde_json::Value,
    },

    /// rewritten connection file could not be written
    #[error("can't write connection file {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    /// json serialization error
    #[error("json error: {0}")]
    JSON(#[from] serde_json::Error),
}

impl ConnectionError {
    pub fn exit_code(&self) -> ExitCode {
        ExitCode::Descriptor
    }
}

/// Which container engine call was running when a launch failed
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Stage {
    Create,
    Start,
    Remove,
    Logs,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Stage::Create => "create",
            Stage::Start => "start",
            Stage::Remove => "rm",
            Stage::Logs => "logs",
        })
    }
}

/// Errors while launching a kernel container
#[derive(Error, Debug)]
pub enum LaunchError {
    /// connection file could not be prepared for the container
    #[error("connection file error: {0}")]
    Descriptor(#[from] ConnectionError),

    /// scoped temporary directory could not be created
    #[error("can't create temporary directory: {0}")]
    TempDir(#[source] std::io::Error),

    /// the container engine can't be reached
    #[error("container engine unavailable during {stage}: {message}")]
    EngineUnavailable { stage: Stage, message: String },

    /// the requested image is not available locally
    #[error("image not found during {stage}: {message}")]
    ImageNotFound { stage: Stage, message: String },

    /// a host port needed by the kernel is already bound
    #[error("port conflict during {stage}: {message}")]
    PortConflict { stage: Stage, message: String },

    /// the engine refused the memory or process count ceilings
    #[error("resource limits rejected during {stage}: {message}")]
    ResourceLimitRejected { stage: Stage, message: String },

    /// any other unexpected exit status from the container engine
    #[error("container engine failed during {stage}, {status}\n{stderr}")]
    Engine {
        stage: Stage,
        status: std::process::ExitStatus,
        stderr: String,
    },

    /// container engine output was not valid utf8
    #[error("container engine output was not valid utf8")]
    Utf8Error(#[from] std::string::FromUtf8Error),
}

impl LaunchError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            LaunchError::Descriptor(_) => ExitCode::Descriptor,
            LaunchError::TempDir(_) => ExitCode::Descriptor,
            LaunchError::EngineUnavailable { .. } => ExitCode::Engine,
            _ => ExitCode::Launch,
        }
    }
}

/// Errors while installing a kernel descriptor
#[derive(Error, Debug)]
pub enum InstallError {
    /// can't determine where kernel descriptors are stored
    #[error("can't determine where to store kernel descriptors")]
    NoDefaultStoreDir,

    /// kernel descriptor store io error
    #[error("kernel descriptor store io error at {path:?}: {source}")]
    Storage {
        path: PathBuf,
        source: std::io::Error,
    },

    /// json error
    #[error("json error: {0}")]
    JSON(#[from] serde_json::Error),

    /// image name does not produce a usable kernel id
    #[error("image name {0:?} does not produce a usable kernel id")]
    InvalidKernelId(String),
}

impl InstallError {
    pub fn exit_code(&self) -> ExitCode {
        ExitCode::Descriptor
    }
}
