//! Unified error type for the capture, classification, and query boundary.
//!
//! `AppError` is the single error type returned across the HTTP surface. It
//! serializes as `{ "kind": "...", "message": "..." }` so a client can
//! programmatically distinguish error categories. Internally, components log
//! and absorb most failures (queue drops, pipeline processor errors, store
//! write failures) rather than propagating them — `AppError` exists for the
//! failures that must actually surface to a caller: bad configuration,
//! capture startup failures, and auth rejections.

use serde::ser::SerializeStruct;

/// Application-level error returned at the HTTP boundary and from lifecycle calls.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Missing or malformed environment/config-file values.
    #[error("{0}")]
    Config(String),

    /// Errors from the packet capture engine (no such interface, denied privileges).
    #[error("{0}")]
    Capture(String),

    /// A single classifier processor failed; the pipeline continues regardless.
    #[error("{0}")]
    Pipeline(String),

    /// Document store insert/aggregate failures.
    #[error("{0}")]
    Store(String),

    /// Bearer-token validation failures at the HTTP boundary.
    #[error("{0}")]
    Auth(String),

    /// I/O and OS-level errors (filesystem, process spawning).
    #[error("{0}")]
    Io(String),

    /// Invalid or missing user input (bad filter grammar, bad pagination args).
    #[error("{0}")]
    InvalidInput(String),
}

impl AppError {
    /// Returns the error kind as a string matching the variant name.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Config(_) => "Config",
            AppError::Capture(_) => "Capture",
            AppError::Pipeline(_) => "Pipeline",
            AppError::Store(_) => "Store",
            AppError::Auth(_) => "Auth",
            AppError::Io(_) => "Io",
            AppError::InvalidInput(_) => "InvalidInput",
        }
    }
}

/// Custom Serialize: produces `{ "kind": "Variant", "message": "..." }`.
impl serde::Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut s = serializer.serialize_struct("AppError", 2)?;
        s.serialize_field("kind", self.kind())?;
        s.serialize_field("message", &self.to_string())?;
        s.end()
    }
}

// ---- From implementations for ergonomic error conversion ----

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(err.to_string())
    }
}

impl From<mongodb::error::Error> for AppError {
    fn from(err: mongodb::error::Error) -> Self {
        AppError::Store(err.to_string())
    }
}

impl From<pcap::Error> for AppError {
    fn from(err: pcap::Error) -> Self {
        AppError::Capture(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_returns_correct_variant_name() {
        assert_eq!(AppError::Config("bad env".into()).kind(), "Config");
        assert_eq!(AppError::Capture("no such device".into()).kind(), "Capture");
        assert_eq!(AppError::Pipeline("processor panicked".into()).kind(), "Pipeline");
        assert_eq!(AppError::Store("insert failed".into()).kind(), "Store");
        assert_eq!(AppError::Auth("bad token".into()).kind(), "Auth");
        assert_eq!(AppError::Io("io fail".into()).kind(), "Io");
        assert_eq!(AppError::InvalidInput("bad input".into()).kind(), "InvalidInput");
    }

    #[test]
    fn test_error_display_shows_message() {
        let err = AppError::Store("connection lost".into());
        assert_eq!(err.to_string(), "connection lost");
    }

    #[test]
    fn test_error_serializes_as_kind_and_message() {
        let err = AppError::Capture("interface not found".into());
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "Capture");
        assert_eq!(json["message"], "interface not found");
    }

    #[test]
    fn test_from_anyhow_produces_config_variant() {
        let anyhow_err = anyhow::anyhow!("missing DATABASE_URI");
        let app_err: AppError = anyhow_err.into();
        assert_eq!(app_err.kind(), "Config");
        assert!(app_err.to_string().contains("missing DATABASE_URI"));
    }

    #[test]
    fn test_from_io_error_produces_io_variant() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let app_err: AppError = io_err.into();
        assert_eq!(app_err.kind(), "Io");
        assert!(app_err.to_string().contains("file missing"));
    }

    #[test]
    fn test_all_variants_serialize_with_two_fields() {
        let variants: Vec<AppError> = vec![
            AppError::Config("a".into()),
            AppError::Capture("b".into()),
            AppError::Pipeline("c".into()),
            AppError::Store("d".into()),
            AppError::Auth("e".into()),
            AppError::Io("f".into()),
            AppError::InvalidInput("g".into()),
        ];
        for err in variants {
            let json = serde_json::to_value(&err).unwrap();
            let obj = json.as_object().unwrap();
            assert_eq!(obj.len(), 2, "Expected exactly 2 fields for {err:?}");
            assert!(obj.contains_key("kind"));
            assert!(obj.contains_key("message"));
        }
    }
}
