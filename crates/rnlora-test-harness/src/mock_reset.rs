//! Mock reset line that records every level change.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::time::Instant;

use rnlora_core::error::{Error, Result};
use rnlora_core::reset::ResetLine;

/// One recorded level change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelChange {
    pub high: bool,
    pub at: Instant,
}

#[derive(Debug, Default)]
struct ResetState {
    changes: Vec<LevelChange>,
    fail: bool,
}

/// A [`ResetLine`] that records levels with tokio timestamps.
///
/// Timestamps come from the tokio clock, so tests running with a paused
/// clock can check pulse widths exactly. Clones share the recording.
#[derive(Debug, Clone, Default)]
pub struct MockResetLine {
    state: Arc<Mutex<ResetState>>,
}

impl MockResetLine {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ResetState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make every subsequent `set_level()` fail.
    pub fn fail(&self) {
        self.lock().fail = true;
    }

    /// All recorded level changes, oldest first.
    pub fn changes(&self) -> Vec<LevelChange> {
        self.lock().changes.clone()
    }

    /// Just the levels, oldest first.
    pub fn levels(&self) -> Vec<bool> {
        self.lock().changes.iter().map(|c| c.high).collect()
    }

    /// The most recent level, if the line was ever driven.
    pub fn level(&self) -> Option<bool> {
        self.lock().changes.last().map(|c| c.high)
    }
}

#[async_trait]
impl ResetLine for MockResetLine {
    async fn set_level(&mut self, high: bool) -> Result<()> {
        let mut state = self.lock();
        if state.fail {
            return Err(Error::Transport("mock reset line failure".into()));
        }
        state.changes.push(LevelChange {
            high,
            at: Instant::now(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_levels_in_order() {
        let observer = MockResetLine::new();
        let mut line = observer.clone();
        assert_eq!(observer.level(), None);

        line.set_level(false).await.unwrap();
        line.set_level(true).await.unwrap();

        assert_eq!(observer.levels(), vec![false, true]);
        assert_eq!(observer.level(), Some(true));
    }

    #[tokio::test(start_paused = true)]
    async fn timestamps_follow_tokio_clock() {
        let observer = MockResetLine::new();
        let mut line = observer.clone();

        line.set_level(false).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        line.set_level(true).await.unwrap();

        let changes = observer.changes();
        assert_eq!(
            changes[1].at - changes[0].at,
            std::time::Duration::from_millis(5)
        );
    }

    #[tokio::test]
    async fn failure_is_reported() {
        let observer = MockResetLine::new();
        let mut line = observer.clone();
        observer.fail();
        assert!(line.set_level(false).await.is_err());
        assert!(observer.levels().is_empty());
    }
}
