use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("unknown sensor: {0}")]
    UnknownSensor(String),

    #[error(transparent)]
    Reading(#[from] ReadingError),
}

/// Errors raised while decoding or encoding the `timestamp,value` wire format.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReadingError {
    #[error("message body is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("expected 2 comma-separated fields, found {found}")]
    FieldCount { found: usize },

    #[error("timestamp field is empty")]
    EmptyTimestamp,

    #[error("timestamp must not contain a comma: {0}")]
    CommaInTimestamp(String),

    #[error("invalid temperature value: {0:?}")]
    InvalidValue(String),

    #[error("temperature value is not finite: {0}")]
    NonFinite(String),
}
