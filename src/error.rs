//! Error types for the MIL-STD-1553B physical layer

use thiserror::Error;

/// Result type for MIL-STD-1553B bus operations
pub type Result<T> = std::result::Result<T, BusError>;

/// Error types encountered while framing, encoding or moving words on the bus
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// A submitted word is not exactly two bytes
    #[error("Invalid word: {0}")]
    InvalidWord(String),

    /// Invalid Manchester encoding
    #[error("Invalid Manchester encoding: {0}")]
    InvalidManchesterEncoding(String),

    /// Insufficient data to decode
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// Bus configuration rejected
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Every handle to a signal line has been dropped
    #[error("Line closed: {0}")]
    LineClosed(String),
}

impl BusError {
    /// Create a new InvalidWord error
    pub fn invalid_word(msg: impl Into<String>) -> Self {
        BusError::InvalidWord(msg.into())
    }

    /// Create a new InvalidManchesterEncoding error
    pub fn invalid_manchester(msg: impl Into<String>) -> Self {
        BusError::InvalidManchesterEncoding(msg.into())
    }

    /// Create a new InsufficientData error
    pub fn insufficient_data(msg: impl Into<String>) -> Self {
        BusError::InsufficientData(msg.into())
    }

    /// Create a new InvalidConfig error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        BusError::InvalidConfig(msg.into())
    }

    /// Create a new LineClosed error
    pub fn line_closed(msg: impl Into<String>) -> Self {
        BusError::LineClosed(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BusError::invalid_word("3 bytes");
        assert!(err.to_string().contains("Invalid word"));
        assert!(err.to_string().contains("3 bytes"));
    }

    #[test]
    fn test_line_closed_display() {
        let err = BusError::line_closed("reset");
        assert_eq!(err.to_string(), "Line closed: reset");
    }
}
