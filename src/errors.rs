// SPDX-License-Identifier: MPL-2.0

//! Error types for the render core
//!
//! Initialization errors (shader compilation, missing sensors, capture session
//! configuration) are surfaced through these types. Per-frame failures are
//! logged and recovered inside the compositor and never reach the caller.

use std::fmt;

/// Result type alias using PipelineError
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type alias for capture-control operations
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Main error type for the render core
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// Shader program failed to compile or link
    Shader(ShaderError),
    /// GPU device or resource errors
    Gpu(String),
    /// Capture-control errors
    Capture(CaptureError),
    /// Orientation sensor errors
    Sensor(String),
    /// Frame data did not match its declared layout
    Frame(String),
    /// Configuration errors
    Config(String),
    /// Parameter bundle or preset catalog could not be parsed
    Serialization(String),
    /// Operation is not valid in the current pipeline state
    InvalidState(String),
}

/// Shader compilation failure with the compiler log
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderError {
    /// Program or entry point that failed
    pub stage: String,
    /// Compiler output, one message per line
    pub log: String,
}

/// Capture-control errors
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureError {
    /// No capture session has been configured yet
    SessionNotConfigured,
    /// Session configuration was rejected by the hardware layer
    ConfigurationFailed(String),
    /// A capture request could not be submitted
    RequestFailed(String),
    /// The command was cancelled before it ran
    Cancelled,
    /// A newer rebuild request replaced this one before it ran
    Superseded,
    /// The capture-control worker is no longer running
    WorkerStopped,
}

impl ShaderError {
    pub fn new(stage: impl Into<String>, log: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            log: log.into(),
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Shader(e) => write!(f, "Shader error: {}", e),
            PipelineError::Gpu(msg) => write!(f, "GPU error: {}", msg),
            PipelineError::Capture(e) => write!(f, "Capture error: {}", e),
            PipelineError::Sensor(msg) => write!(f, "Sensor error: {}", msg),
            PipelineError::Frame(msg) => write!(f, "Frame error: {}", msg),
            PipelineError::Config(msg) => write!(f, "Configuration error: {}", msg),
            PipelineError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            PipelineError::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
        }
    }
}

impl fmt::Display for ShaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed to compile:\n{}", self.stage, self.log)
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::SessionNotConfigured => write!(f, "Capture session not configured"),
            CaptureError::ConfigurationFailed(msg) => {
                write!(f, "Session configuration failed: {}", msg)
            }
            CaptureError::RequestFailed(msg) => write!(f, "Capture request failed: {}", msg),
            CaptureError::Cancelled => write!(f, "Cancelled"),
            CaptureError::Superseded => write!(f, "Superseded by a newer request"),
            CaptureError::WorkerStopped => write!(f, "Capture-control worker stopped"),
        }
    }
}

impl std::error::Error for PipelineError {}
impl std::error::Error for ShaderError {}
impl std::error::Error for CaptureError {}

impl From<ShaderError> for PipelineError {
    fn from(err: ShaderError) -> Self {
        PipelineError::Shader(err)
    }
}

impl From<CaptureError> for PipelineError {
    fn from(err: CaptureError) -> Self {
        PipelineError::Capture(err)
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Config(err.to_string())
    }
}
