//! Error types
//!
//! Registry operations never fail: stale references are no-ops. Errors only
//! surface from the collaborators around it (connection writes, frame encoding).

use thiserror::Error;

use crate::connection::ConnectionId;
use crate::registry::RelayId;

/// Result alias for fallible operations in this crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug, Error)]
pub enum Error {
    /// Writing to a connection failed
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// An envelope could not be rendered to JSON
    #[error("failed to encode envelope: {0}")]
    Encode(#[from] serde_json::Error),

    /// Registry bookkeeping check failed
    #[error(transparent)]
    Inconsistent(#[from] ConsistencyError),
}

/// Failure of a single [`Connection::write`](crate::connection::Connection::write)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// The peer is gone
    #[error("connection closed")]
    Closed,

    /// The outbound buffer is full
    #[error("outbound buffer full")]
    Backpressure,
}

/// Broken link between a subscription handle and its listener entry
///
/// Returned by [`RelayGroup::check_consistency`](crate::registry::RelayGroup::check_consistency).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsistencyError {
    /// The handle points past the end of the serving table
    #[error("{connection}/{subscription_id} points past {serving} table end ({index})")]
    Dangling {
        connection: ConnectionId,
        subscription_id: String,
        serving: RelayId,
        index: usize,
    },

    /// The entry at the handle's position belongs to another subscription
    #[error("{connection}/{subscription_id} at {serving}[{index}] holds another subscription")]
    Mismatch {
        connection: ConnectionId,
        subscription_id: String,
        serving: RelayId,
        index: usize,
    },

    /// Some listener entries have no owning handle
    #[error("{handles} handles for {listeners} listener entries")]
    Orphaned { handles: usize, listeners: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_error_display() {
        assert_eq!(ConnectionError::Closed.to_string(), "connection closed");
        assert_eq!(
            ConnectionError::Backpressure.to_string(),
            "outbound buffer full"
        );
    }

    #[test]
    fn test_connection_error_converts() {
        let err: Error = ConnectionError::Closed.into();
        assert!(matches!(err, Error::Connection(ConnectionError::Closed)));
        assert_eq!(err.to_string(), "connection closed");
    }

    #[test]
    fn test_consistency_error_display() {
        let err = ConsistencyError::Dangling {
            connection: ConnectionId(3),
            subscription_id: "feed".into(),
            serving: RelayId(1),
            index: 7,
        };
        assert_eq!(err.to_string(), "conn-3/feed points past relay-1 table end (7)");

        let err: Error = ConsistencyError::Orphaned {
            handles: 1,
            listeners: 2,
        }
        .into();
        assert_eq!(err.to_string(), "1 handles for 2 listener entries");
    }
}
