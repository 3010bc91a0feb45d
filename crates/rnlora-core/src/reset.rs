//! Reset line abstraction.
//!
//! The module's reset pin is active low: driving the line low holds the
//! radio in reset (powered down), driving it high lets it boot. Delays
//! between level changes are the caller's business; implementations only
//! change the level.

use async_trait::async_trait;

use crate::error::Result;

/// A single binary output connected to the module's reset pin.
#[async_trait]
pub trait ResetLine: Send + Sync {
    /// Drive the line to the given logical level (`true` = high).
    async fn set_level(&mut self, high: bool) -> Result<()>;
}

/// Stand-in for a module whose reset pin is not wired.
///
/// Level changes succeed and do nothing, so the bring-up sequence runs
/// unchanged (including its delays) whether or not a reset line exists.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoResetLine;

#[async_trait]
impl ResetLine for NoResetLine {
    async fn set_level(&mut self, _high: bool) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_reset_line_accepts_both_levels() {
        let mut line = NoResetLine;
        assert!(line.set_level(false).await.is_ok());
        assert!(line.set_level(true).await.is_ok());
    }
}
