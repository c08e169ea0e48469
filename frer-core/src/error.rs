//! Error types for FRER test operations

/// Errors raised by the capture, transmission and configuration layers.
///
/// Frames that do not carry an R-TAG are never an error; the codec
/// reports them as absent.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FrerError {
    /// IO error from an underlying file or socket
    #[error("IO error: {0}")]
    Io(String),

    /// The frame source failed while capturing
    #[error("Capture error: {0}")]
    Capture(String),

    /// The frame sink failed while transmitting
    #[error("Transmit error: {0}")]
    Transmit(String),

    /// The process lacks the privilege to open a raw interface
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// A configuration value is out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A MAC address string could not be parsed
    #[error("Invalid MAC address: {0:?}")]
    InvalidMac(String),
}

impl From<std::io::Error> for FrerError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => FrerError::PermissionDenied(err.to_string()),
            _ => FrerError::Io(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_permission_maps_to_permission_denied() {
        let err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "socket");
        assert!(matches!(FrerError::from(err), FrerError::PermissionDenied(_)));
    }

    #[test]
    fn test_display() {
        let err = FrerError::InvalidMac("zz:00".into());
        assert_eq!(err.to_string(), "Invalid MAC address: \"zz:00\"");
    }
}
