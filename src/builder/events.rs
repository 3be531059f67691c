//! Lifecycle event types for JSON output.
//!
//! These events are emitted, one JSON object per line, when using
//! `--message-format=json`.
//!
//! # Event Types
//!
//! - `build-started`: the manifest was loaded and the build is starting
//! - `part-state`: a part moved through its lifecycle
//! - `stage-finished`: a lifecycle stage (resolve, build, stage, prime) completed
//! - `package-emitted`: the descriptor (and optionally an archive) was written
//! - `build-finished`: the run completed, successfully or not
//!
//! # Stability
//!
//! New fields may be added, but existing fields should not be removed or
//! renamed.

use std::path::PathBuf;

use serde::Serialize;

use crate::builder::state::PartState;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason")]
pub enum BuildEvent {
    #[serde(rename = "build-started")]
    BuildStarted {
        project: String,
        version: String,
        parts: Vec<String>,
    },

    #[serde(rename = "part-state")]
    PartTransition {
        part: String,
        state: PartState,
        previous: PartState,
        /// Failure message for `failed`
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    #[serde(rename = "stage-finished")]
    StageFinished {
        stage: String,
        duration_ms: u64,
    },

    #[serde(rename = "package-emitted")]
    PackageEmitted {
        descriptor: PathBuf,
        #[serde(skip_serializing_if = "Option::is_none")]
        archive: Option<PathBuf>,
        #[serde(skip_serializing_if = "Option::is_none")]
        sha256: Option<String>,
    },

    #[serde(rename = "build-finished")]
    BuildFinished {
        success: bool,
        duration_ms: u64,
        /// Last lifecycle stage completed
        #[serde(skip_serializing_if = "Option::is_none")]
        last_stage: Option<String>,
    },
}

impl BuildEvent {
    pub fn part_state(part: impl Into<String>, previous: PartState, state: PartState) -> Self {
        BuildEvent::PartTransition {
            part: part.into(),
            state,
            previous,
            message: None,
        }
    }

    pub fn part_failed(
        part: impl Into<String>,
        previous: PartState,
        message: impl Into<String>,
    ) -> Self {
        BuildEvent::PartTransition {
            part: part.into(),
            state: PartState::Failed,
            previous,
            message: Some(message.into()),
        }
    }

    pub fn stage_finished(stage: impl Into<String>, duration_ms: u64) -> Self {
        BuildEvent::StageFinished {
            stage: stage.into(),
            duration_ms,
        }
    }

    pub fn finished(success: bool, duration_ms: u64, last_stage: Option<String>) -> Self {
        BuildEvent::BuildFinished {
            success,
            duration_ms,
            last_stage,
        }
    }

    /// Serialize this event to a JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_state_serialization() {
        let event = BuildEvent::part_state("zed", PartState::Fetching, PartState::Building);
        let json = event.to_json();
        assert!(json.contains("\"reason\":\"part-state\""));
        assert!(json.contains("\"part\":\"zed\""));
        assert!(json.contains("\"state\":\"building\""));
        assert!(json.contains("\"previous\":\"fetching\""));
        assert!(!json.contains("message"));
    }

    #[test]
    fn test_failed_carries_message() {
        let event = BuildEvent::part_failed("zed", PartState::Building, "exit code 101");
        let json = event.to_json();
        assert!(json.contains("\"state\":\"failed\""));
        assert!(json.contains("\"message\":\"exit code 101\""));
    }

    #[test]
    fn test_finished_serialization() {
        let event = BuildEvent::finished(false, 2340, Some("build".into()));
        let json = event.to_json();
        assert!(json.contains("\"reason\":\"build-finished\""));
        assert!(json.contains("\"success\":false"));
        assert!(json.contains("\"duration_ms\":2340"));
        assert!(json.contains("\"last_stage\":\"build\""));
    }
}
