use thiserror::Error;

/// Failure of a single venue call, as surfaced by an exchange client.
///
/// The engine treats every variant as "no data this cycle" for the affected
/// pair or venue; none of them is fatal once the main loop is running.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VenueError {
    /// The request timed out, including after the single retry.
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Transport-level or HTTP-level failure.
    #[error("Venue unavailable: {0}")]
    Unavailable(String),

    /// The response could not be decoded or lacked required fields.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// The venue processed the request and refused it.
    #[error("Rejected by venue: {0}")]
    Rejected(String),
}

impl VenueError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, VenueError::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_display() {
        let err = VenueError::Timeout("GET /fapi/v1/ticker/bookTicker".to_string());
        assert_eq!(
            format!("{}", err),
            "Request timed out: GET /fapi/v1/ticker/bookTicker"
        );
        assert!(err.is_timeout());
    }

    #[test]
    fn test_invalid_payload_display() {
        let err = VenueError::InvalidPayload("missing bidPrice".to_string());
        assert_eq!(format!("{}", err), "Invalid payload: missing bidPrice");
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_rejected_display() {
        let err = VenueError::Rejected("insufficient margin".to_string());
        assert_eq!(format!("{}", err), "Rejected by venue: insufficient margin");
    }

    #[test]
    fn test_unavailable_display() {
        let err = VenueError::Unavailable("connection reset".to_string());
        assert_eq!(format!("{}", err), "Venue unavailable: connection reset");
    }
}
