use std::fmt;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid data: {0}")]
    Data(String),

    #[error("Invalid geometry in feature {feature}: {message}")]
    Geometry { feature: String, message: String },

    #[error("Failed to decode input: {0}")]
    Decode(String),

    #[error("Failed to encode raster: {0}")]
    Encode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProcessingError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn data(message: impl Into<String>) -> Self {
        Self::Data(message.into())
    }

    pub fn geometry(feature: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Geometry {
            feature: feature.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Config,
            Self::Data(_) => ErrorKind::Data,
            Self::Geometry { .. } => ErrorKind::Geometry,
            Self::Decode(_) | Self::Encode(_) | Self::Io(_) => ErrorKind::Io,
        }
    }
}

/// Coarse classification used when reporting a failed layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unknown method, missing parameter or missing layer selector. Raised before any step runs.
    Config,
    /// Input that cannot support the requested computation.
    Data,
    /// Invalid or unparseable vector geometry.
    Geometry,
    /// Reading or writing through an I/O collaborator.
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Config => "ConfigError",
            ErrorKind::Data => "DataError",
            ErrorKind::Geometry => "GeometryError",
            ErrorKind::Io => "IoError",
        };
        f.write_str(name)
    }
}

/// Structured failure of one layer's pipeline run.
#[derive(Error, Debug)]
#[error("layer '{layer_id}' failed {}: [{kind}] {source}", step_label(.step_index, .kind))]
pub struct PipelineError {
    pub layer_id: String,
    /// `None` for failures outside the step sequence, i.e. validation or I/O.
    pub step_index: Option<usize>,
    pub kind: ErrorKind,
    #[source]
    pub source: ProcessingError,
}

impl PipelineError {
    pub fn new(
        layer_id: impl Into<String>,
        step_index: Option<usize>,
        source: ProcessingError,
    ) -> Self {
        Self {
            layer_id: layer_id.into(),
            step_index,
            kind: source.kind(),
            source,
        }
    }
}

fn step_label(step_index: &Option<usize>, kind: &ErrorKind) -> String {
    match (step_index, kind) {
        (Some(index), _) => format!("at step {index}"),
        (None, ErrorKind::Io) => "during input/output".to_string(),
        (None, _) => "during validation".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, ProcessingError>;
