use thiserror::Error;

use crate::cycle::Phase;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("secret `{0}` is missing or empty")]
    MissingSecret(&'static str),
    #[error("invalid url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },
    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed `{0}` returned no samples")]
    Empty(String),
    #[error("feed `{feed}` returned a non-numeric value `{value}`")]
    InvalidValue { feed: String, value: String },
    #[error("feed `{feed}` response could not be decoded: {source}")]
    Decode {
        feed: String,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Error)]
pub enum ForecastError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("forecast response could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("forecast is missing `{0}`")]
    MissingField(String),
    #[error("forecast timestamp {0} is out of range")]
    Timestamp(i64),
    #[error(transparent)]
    Icon(#[from] IconError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("no sprite for weather icon code `{0}`")]
pub struct IconError(pub String);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("sprite sheet width must be non-zero")]
    ZeroWidth,
    #[error("sprite sheet data ({len} bytes) does not fill whole rows of {width}px")]
    RaggedRows { len: usize, width: u32 },
}

#[derive(Debug, Error)]
#[error("device error: {0}")]
pub struct DeviceError(pub String);

impl DeviceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<RenderError> for DeviceError {
    fn from(err: RenderError) -> Self {
        Self(err.to_string())
    }
}

/// Failure of a whole wake cycle, tagged with the phase it happened in.
#[derive(Debug, Error)]
#[error("{phase} failed: {kind}")]
pub struct CycleError {
    pub phase: Phase,
    #[source]
    pub kind: CycleErrorKind,
}

#[derive(Debug, Error)]
pub enum CycleErrorKind {
    #[error(transparent)]
    Feed(#[from] FeedError),
    #[error(transparent)]
    Forecast(#[from] ForecastError),
    #[error(transparent)]
    Device(#[from] DeviceError),
}

impl CycleError {
    pub fn new(phase: Phase, kind: impl Into<CycleErrorKind>) -> Self {
        Self {
            phase,
            kind: kind.into(),
        }
    }
}
