/// Utility functions for common operations across the codebase

/// Get current timestamp in microseconds since epoch
///
/// Used as a store's `instance_start_time`. Replication peers compare it
/// between checkpoints to detect that the target was restarted.
pub fn current_timestamp_micros() -> u64 {
    chrono::Utc::now().timestamp_micros().max(0) as u64
}

/// Generate an identifier for a document written without `_id`
pub fn new_document_id() -> String {
    uuid::Uuid::new_v4().to_string().to_lowercase()
}
