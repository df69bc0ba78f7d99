//! Error types for the jsobs demo

use jsobs::StoreError;
use std::fmt;

#[derive(Debug)]
pub enum DemoError {
    Store(StoreError),
    Config(String),
    Mismatch(String),
}

impl fmt::Display for DemoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DemoError::Store(err) => write!(f, "Storage error: {}", err),
            DemoError::Config(msg) => write!(f, "Configuration error: {}", msg),
            DemoError::Mismatch(msg) => write!(f, "Round trip mismatch: {}", msg),
        }
    }
}

impl std::error::Error for DemoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DemoError::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for DemoError {
    fn from(err: StoreError) -> Self {
        DemoError::Store(err)
    }
}

impl From<tracing_subscriber::filter::ParseError> for DemoError {
    fn from(err: tracing_subscriber::filter::ParseError) -> Self {
        DemoError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DemoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let err = DemoError::from(StoreError::AlreadyPurging);
        assert_eq!(
            format!("{}", err),
            "Storage error: Purge already in progress"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_config_error_display() {
        let err = DemoError::Config("bad directive".to_string());
        assert_eq!(format!("{}", err), "Configuration error: bad directive");
    }

    #[test]
    fn test_mismatch_error_display() {
        let err = DemoError::Mismatch("/demo/t0.json".to_string());
        assert_eq!(format!("{}", err), "Round trip mismatch: /demo/t0.json");
    }
}
