use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("{device} is unavailable: {reason}")]
    Unavailable { device: &'static str, reason: String },
    #[error("{device} I/O failure: {message}")]
    Io { device: &'static str, message: String },
    #[error("{device} does not support {what}")]
    Unsupported { device: &'static str, what: String },
}
