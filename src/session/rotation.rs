//! Session identifier rotation.
//!
//! Bounds how long any single identifier stays valid. Rotation is checked
//! once per request, when a session is first started; it keeps the data and
//! replaces the identifier.

use super::Session;
use crate::Result;

/// Decides whether a starting session needs a new identifier.
///
/// An identifier is due once more than `timeout` seconds have passed since the
/// last rotation. A session that was never rotated counts as rotated at 0.
///
/// # Example
///
/// ```rust
/// use sealed_session::session::IdentityRotator;
///
/// let rotator = IdentityRotator::new(3600);
/// assert!(!rotator.is_due(Some(1_000), 4_600));
/// assert!(rotator.is_due(Some(1_000), 4_601));
/// assert!(rotator.is_due(None, 4_601));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityRotator {
    timeout: i64,
}

impl IdentityRotator {
    pub fn new(timeout: i64) -> Self {
        Self { timeout }
    }

    pub fn is_due(&self, last_access_time: Option<i64>, now: i64) -> bool {
        now.saturating_sub(last_access_time.unwrap_or(0)) > self.timeout
    }

    /// Rotates `session` if its identifier is due. Returns true if it rotated.
    pub(crate) fn run(&self, session: &mut Session<'_>, now: i64) -> Result<bool> {
        if !self.is_due(session.last_access_time(), now) {
            return Ok(false);
        }
        session.regenerate_id_at(now)?;
        Ok(true)
    }
}
