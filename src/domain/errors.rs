//! Adapter errors

use thiserror::Error;

pub type AdapterResult<T> = Result<T, AdapterError>;

/// Precondition and protocol violations raised by the adapter itself.
///
/// Failures coming from the gateway transport are not wrapped: they travel
/// as [`eyre::Report`] through [`crate::AnyResult`] untouched.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("samesite should be one of strict, lax or none, got {0:?}")]
    InvalidSameSite(String),

    #[error("illegal cookie name: {0:?}")]
    InvalidCookieName(String),

    #[error("expected a {expected:?} message, received {received:?}")]
    UnexpectedMessage {
        expected: &'static str,
        received: String,
    },

    #[error("malformed params: {0}")]
    MalformedParams(String),

    #[error("missing key: {0:?}")]
    MissingKey(String),

    #[error("request was built without a body receiver")]
    NoReceiver,

    #[error("gateway channel is closed")]
    Disconnected,

    #[error("invalid utf-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("failed to format cookie date: {0}")]
    DateFormat(#[from] time::error::Format),
}
