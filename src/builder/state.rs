//! Per-part lifecycle state.

use std::fmt;
use std::sync::Mutex;

use indexmap::IndexMap;
use serde::Serialize;

/// Where a part is in `pending → fetching → building → built | failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PartState {
    Pending,
    Fetching,
    Building,
    Built,
    Failed,
}

impl PartState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartState::Pending => "pending",
            PartState::Fetching => "fetching",
            PartState::Building => "building",
            PartState::Built => "built",
            PartState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PartState::Built | PartState::Failed)
    }

    /// Whether `self → next` is a legal transition.
    pub fn can_transition_to(&self, next: PartState) -> bool {
        use PartState::*;
        matches!(
            (self, next),
            (Pending, Fetching)
                | (Fetching, Building)
                | (Fetching, Failed)
                | (Building, Built)
                | (Building, Failed)
        )
    }
}

impl fmt::Display for PartState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared state table for all parts of one build, in declaration order.
#[derive(Debug)]
pub struct PartStates {
    states: Mutex<IndexMap<String, PartState>>,
}

impl PartStates {
    /// Every part starts `pending`.
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        PartStates {
            states: Mutex::new(
                parts
                    .into_iter()
                    .map(|p| (p.into(), PartState::Pending))
                    .collect(),
            ),
        }
    }

    pub fn get(&self, part: &str) -> Option<PartState> {
        self.lock().get(part).copied()
    }

    /// Move `part` to `next`, returning the previous state.
    ///
    /// Illegal transitions are refused and leave the table unchanged.
    pub fn transition(&self, part: &str, next: PartState) -> Option<PartState> {
        let mut states = self.lock();
        let current = states.get_mut(part)?;
        if !current.can_transition_to(next) {
            tracing::debug!("refusing {} transition {} -> {}", part, current, next);
            return None;
        }
        let previous = *current;
        *current = next;
        Some(previous)
    }

    /// A copy of the table.
    pub fn snapshot(&self) -> IndexMap<String, PartState> {
        self.lock().clone()
    }

    pub fn all_built(&self) -> bool {
        self.lock().values().all(|s| *s == PartState::Built)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, IndexMap<String, PartState>> {
        self.states.lock().unwrap_or_else(|e| e.into_inner())
    }
}
