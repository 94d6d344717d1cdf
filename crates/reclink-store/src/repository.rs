use reclink_core::{Recording, RecordingId, RecordingStatus, Target, TargetId};

use crate::error::Result;

/// Persistence seam between the engine and its durable state.
///
/// Calls are synchronous and short; async callers invoke them directly
/// without holding any lock across an `.await`.
pub trait LifecycleRepository: Send + Sync {
    // --- targets -------------------------------------------------------------

    /// Insert a new target. `DuplicateTarget` if the platform/broadcaster pair
    /// is already configured.
    fn create_target(&self, target: &Target) -> Result<()>;

    fn get_target(&self, id: &TargetId) -> Result<Option<Target>>;

    /// Overwrite every column of an existing target. `TargetNotFound` if absent.
    fn update_target(&self, target: &Target) -> Result<()>;

    /// Delete a target; its recordings keep their rows with `target_id = NULL`.
    /// Returns `false` when no such target existed.
    fn delete_target(&self, id: &TargetId) -> Result<bool>;

    /// All targets ordered by creation time.
    fn list_targets(&self) -> Result<Vec<Target>>;

    fn list_enabled_targets(&self) -> Result<Vec<Target>>;

    fn list_rotation_enabled_targets(&self) -> Result<Vec<Target>>;

    // --- recordings ----------------------------------------------------------

    /// Insert a new recording. `ActiveRecordingExists` if it is active and its
    /// target already has an active recording.
    fn create_recording(&self, recording: &Recording) -> Result<()>;

    fn get_recording(&self, id: &RecordingId) -> Result<Option<Recording>>;

    /// Overwrite every mutable column. `RecordingNotFound` if absent.
    fn update_recording(&self, recording: &Recording) -> Result<()>;

    /// Apply several updates atomically: all succeed or none do.
    fn update_recordings(&self, recordings: &[Recording]) -> Result<()>;

    /// Returns `false` when no such recording existed.
    fn delete_recording(&self, id: &RecordingId) -> Result<bool>;

    /// A target's recordings, newest first.
    fn list_recordings(&self, target_id: &TargetId) -> Result<Vec<Recording>>;

    /// Recordings in any of `statuses`, newest first.
    fn list_recordings_by_status(&self, statuses: &[RecordingStatus]) -> Result<Vec<Recording>>;

    /// Most recent recordings across all targets, newest first.
    fn list_recent_recordings(&self, limit: usize) -> Result<Vec<Recording>>;

    /// The target's `pending`/`recording` row, if any.
    fn active_recording(&self, target_id: &TargetId) -> Result<Option<Recording>>;

    fn count_active_recordings(&self, target_id: &TargetId) -> Result<u32>;

    /// `RecordingNotFound` if absent.
    fn set_favorite(&self, id: &RecordingId, favorite: bool) -> Result<()>;

    /// Update size and duration of a row that is still `recording`. Returns
    /// `false` when the row is gone or has already been finalized.
    fn update_progress(&self, id: &RecordingId, file_size: u64, duration: i64) -> Result<bool>;
}
