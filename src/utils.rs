//! Utility functions for the session service

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

/// Generate a new unique session ID
pub fn generate_session_id() -> Uuid {
    Uuid::new_v4()
}

/// Generate a new transport handle for an incoming connection
pub fn generate_connection_id() -> String {
    format!("conn-{}", Uuid::new_v4())
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Whether `last_activity` is more than `timeout` before `now`
pub fn is_idle(last_activity: DateTime<Utc>, now: DateTime<Utc>, timeout: Duration) -> bool {
    now - last_activity > timeout
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_unique_ids() {
        let id1 = generate_session_id();
        let id2 = generate_session_id();
        assert_ne!(id1, id2);

        let conn1 = generate_connection_id();
        let conn2 = generate_connection_id();
        assert_ne!(conn1, conn2);
        assert!(conn1.starts_with("conn-"));
    }

    #[test]
    fn test_is_idle() {
        let now = current_timestamp();
        let timeout = Duration::seconds(60);

        assert!(!is_idle(now, now, timeout));
        assert!(!is_idle(now - Duration::seconds(60), now, timeout));
        assert!(is_idle(now - Duration::seconds(61), now, timeout));
    }
}
