use std::fmt;

/// Why the authoritative record could not be retrieved.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchError {
    /// No row exists for the game identifier
    NotFound(String),
    /// Transport failure, bad status, or undecodable body
    Network(String),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::NotFound(id) => write!(f, "game '{}' not found", id),
            FetchError::Network(msg) => write!(f, "network error: {}", msg),
        }
    }
}

impl std::error::Error for FetchError {}

/// Failures reported to the listener.
///
/// None of these are returned from the manager's public operations; they are
/// rendered with `to_string()` and handed to `SyncListener::on_error`.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncError {
    /// The channel errored, timed out, closed, or could not be opened
    SubscriptionFailure(String),
    /// A poll tick could not retrieve state
    FetchFailure(FetchError),
    /// Retry budget spent; needs an explicit reconnect
    RetriesExhausted { attempts: u32 },
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::SubscriptionFailure(reason) => {
                write!(f, "realtime subscription failed: {}", reason)
            }
            SyncError::FetchFailure(e) => write!(f, "failed to fetch game state: {}", e),
            SyncError::RetriesExhausted { attempts } => write!(
                f,
                "connection failed after {} attempts, reconnect to try again",
                attempts
            ),
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncError::FetchFailure(e) => Some(e),
            _ => None,
        }
    }
}

impl From<FetchError> for SyncError {
    fn from(e: FetchError) -> Self {
        SyncError::FetchFailure(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_plain_text() {
        let e = SyncError::SubscriptionFailure("channel timed out".to_string());
        assert_eq!(e.to_string(), "realtime subscription failed: channel timed out");

        let e = SyncError::from(FetchError::NotFound("g42".to_string()));
        assert_eq!(e.to_string(), "failed to fetch game state: game 'g42' not found");

        let e = SyncError::RetriesExhausted { attempts: 3 };
        assert!(e.to_string().contains("after 3 attempts"));
    }
}
