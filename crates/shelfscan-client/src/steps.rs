//! Pipeline step state machine.
//!
//! Five named steps narrate scan progress to the user. The machine only
//! enforces legality (one active step at a time, fixed order, atomic reset);
//! the orchestration layer issues transitions as the real operations start
//! and finish. Keeping narration separate from the async work makes the
//! progression deterministic and testable.

/// Narrated pipeline phases, in fixed declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKey {
    Optimize,
    Upload,
    Analyze,
    Extract,
    Enrich,
}

impl StepKey {
    pub const ALL: [StepKey; 5] = [
        StepKey::Optimize,
        StepKey::Upload,
        StepKey::Analyze,
        StepKey::Extract,
        StepKey::Enrich,
    ];

    fn index(self) -> usize {
        match self {
            StepKey::Optimize => 0,
            StepKey::Upload => 1,
            StepKey::Analyze => 2,
            StepKey::Extract => 3,
            StepKey::Enrich => 4,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            StepKey::Optimize => "Optimizing photo",
            StepKey::Upload => "Uploading",
            StepKey::Analyze => "Analyzing shelf",
            StepKey::Extract => "Extracting books",
            StepKey::Enrich => "Enriching results",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Pending,
    Active,
    Done,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum StepError {
    #[error("step {0:?} is not pending")]
    NotPending(StepKey),

    #[error("step {0:?} is not active")]
    NotActive(StepKey),

    #[error("cannot activate {0:?} while {1:?} is active")]
    AnotherActive(StepKey, StepKey),

    #[error("cannot activate {0:?} before earlier steps complete")]
    OutOfOrder(StepKey),
}

/// The step machine. `pending → active → done` per step, in declaration
/// order, never regressing except through [`reset`](PipelineSteps::reset).
#[derive(Debug, Clone)]
pub struct PipelineSteps {
    statuses: [StepStatus; 5],
}

impl PipelineSteps {
    pub fn new() -> Self {
        Self {
            statuses: [StepStatus::Pending; 5],
        }
    }

    pub fn status(&self, key: StepKey) -> StepStatus {
        self.statuses[key.index()]
    }

    pub fn active(&self) -> Option<StepKey> {
        StepKey::ALL
            .into_iter()
            .find(|key| self.status(*key) == StepStatus::Active)
    }

    pub fn all_done(&self) -> bool {
        self.statuses.iter().all(|s| *s == StepStatus::Done)
    }

    /// Mark `key` active. All earlier steps must be done, no other step may
    /// be active, and `key` itself must still be pending.
    pub fn activate(&mut self, key: StepKey) -> Result<(), StepError> {
        if let Some(current) = self.active() {
            return Err(StepError::AnotherActive(key, current));
        }
        if self.status(key) != StepStatus::Pending {
            return Err(StepError::NotPending(key));
        }
        if self.statuses[..key.index()]
            .iter()
            .any(|s| *s != StepStatus::Done)
        {
            return Err(StepError::OutOfOrder(key));
        }

        self.statuses[key.index()] = StepStatus::Active;
        Ok(())
    }

    /// Mark the active step `key` done.
    pub fn complete(&mut self, key: StepKey) -> Result<(), StepError> {
        if self.status(key) != StepStatus::Active {
            return Err(StepError::NotActive(key));
        }
        self.statuses[key.index()] = StepStatus::Done;
        Ok(())
    }

    /// Return every step to pending in one assignment. Used when a new scan
    /// starts and when recovering from a mid-pipeline failure.
    pub fn reset(&mut self) {
        self.statuses = [StepStatus::Pending; 5];
    }

    pub fn snapshot(&self) -> Vec<(StepKey, StepStatus)> {
        StepKey::ALL
            .into_iter()
            .map(|key| (key, self.status(key)))
            .collect()
    }
}

impl Default for PipelineSteps {
    fn default() -> Self {
        Self::new()
    }
}
