use std::borrow::Cow;
use std::fmt;

/// Reason a segment name was rejected by [`validate_segment_name`](crate::validate_segment_name).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentError {
    Empty,
    InvalidCharacter,
    ReservedPrefix,
    TooLong,
}

impl fmt::Display for SegmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Empty => "empty",
            Self::InvalidCharacter => "invalid character",
            Self::ReservedPrefix => "reserved prefix",
            Self::TooLong => "too long",
        };
        f.write_str(label)
    }
}

/// A specialized [`StoreError`] enum of this crate.
///
/// Every variant carries plain text only, so a single outcome can be cloned and
/// handed to every caller waiting on the same connection attempt.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// Raised by collection resolution while the connection is not ready.
    #[error("Connection not ready{}", format_context(.context))]
    ConnectionNotReady { context: Option<Cow<'static, str>> },

    /// Raised by `get`/`set`/`drop` while the connection is not ready.
    #[error("Connection not started{}", format_context(.context))]
    ConnectionNotStarted { context: Option<Cow<'static, str>> },

    #[error("Invalid key{}: {message}", format_context(.context))]
    InvalidKey { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("{message}{}", format_context(.context))]
    InvalidSegmentName {
        reason: SegmentError,
        message: Cow<'static, str>,
        context: Option<Cow<'static, str>>,
    },

    /// Construction-time rejection of the partition (database) name.
    #[error("{message}{}", format_context(.context))]
    InvalidPartition { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("{message}{}", format_context(.context))]
    InvalidTtl { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// Value serialization or record decoding failed.
    #[error("{message}{}", format_context(.context))]
    Encoding { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("{message}{}", format_context(.context))]
    NullCollection { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// Error reported by the backend driver, message preserved verbatim.
    #[error("{message}{}", format_context(.context))]
    Backend { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    /// Internal fallback for unexpected issues or logic errors.
    #[error("Internal store error{}: {message}", format_context(.context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

impl StoreError {
    /// Wraps any backend failure, keeping only its message text.
    pub fn backend(err: impl fmt::Display) -> Self {
        Self::Backend { message: err.to_string().into(), context: None }
    }

    pub(crate) fn segment(reason: SegmentError, message: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidSegmentName { reason, message: message.into(), context: None }
    }

    pub(crate) fn encoding(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Encoding { message: message.into(), context: None }
    }

    /// The bare message, without the context suffix.
    #[must_use]
    pub fn message(&self) -> Cow<'_, str> {
        match self {
            Self::ConnectionNotReady { .. } => Cow::Borrowed("Connection not ready"),
            Self::ConnectionNotStarted { .. } => Cow::Borrowed("Connection not started"),
            Self::InvalidKey { message, .. }
            | Self::InvalidSegmentName { message, .. }
            | Self::InvalidPartition { message, .. }
            | Self::InvalidTtl { message, .. }
            | Self::Encoding { message, .. }
            | Self::NullCollection { message, .. }
            | Self::Backend { message, .. }
            | Self::Internal { message, .. } => Cow::Borrowed(message.as_ref()),
        }
    }

    fn context_slot(&mut self) -> &mut Option<Cow<'static, str>> {
        match self {
            Self::ConnectionNotReady { context }
            | Self::ConnectionNotStarted { context }
            | Self::InvalidKey { context, .. }
            | Self::InvalidSegmentName { context, .. }
            | Self::InvalidPartition { context, .. }
            | Self::InvalidTtl { context, .. }
            | Self::Encoding { context, .. }
            | Self::NullCollection { context, .. }
            | Self::Backend { context, .. }
            | Self::Internal { context, .. } => context,
        }
    }
}

pub trait StoreErrorExt<T> {
    fn context(self, context: impl Into<Cow<'static, str>>) -> Result<T, StoreError>;
}

impl<T> StoreErrorExt<T> for Result<T, StoreError> {
    fn context(self, context: impl Into<Cow<'static, str>>) -> Result<T, StoreError> {
        self.map_err(|mut err| {
            *err.context_slot() = Some(context.into());
            err
        })
    }
}

impl From<&'static str> for StoreError {
    fn from(message: &'static str) -> Self {
        Self::Internal { message: Cow::Borrowed(message), context: None }
    }
}

impl From<String> for StoreError {
    fn from(message: String) -> Self {
        Self::Internal { message: Cow::Owned(message), context: None }
    }
}

fn format_context(context: &Option<Cow<'static, str>>) -> Cow<'static, str> {
    context.as_ref().map_or(Cow::Borrowed(""), |c| Cow::Owned(format!(" ({c})")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_errors_keep_their_message() {
        let err = StoreError::backend("test");
        assert_eq!(err.to_string(), "test");
        assert_eq!(err.message(), "test");
    }

    #[test]
    fn context_is_appended_to_display() {
        let res: Result<(), StoreError> = Err(StoreError::backend("boom"));
        let err = res.context("Writing record").unwrap_err();
        assert_eq!(err.to_string(), "boom (Writing record)");
        assert_eq!(err.message(), "boom");
    }

    #[test]
    fn readiness_errors_have_fixed_messages() {
        let err = StoreError::ConnectionNotStarted { context: None };
        assert_eq!(err.to_string(), "Connection not started");
        let err = StoreError::ConnectionNotReady { context: None };
        assert_eq!(err.to_string(), "Connection not ready");
    }
}
