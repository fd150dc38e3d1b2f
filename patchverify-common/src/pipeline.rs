// patchverify-common/src/pipeline.rs
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Events emitted by the orchestrator, in order, for the reporting stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialEvent {
    TrialCount {
        count: usize,
    },
    Started {
        name: String,
    },
    Ignored {
        name: String,
        message: String,
    },
    Failed {
        name: String,
        message: String,
        details: String,
    },
    Finished {
        name: String,
        duration_ms: u128,
    },
}

impl TrialEvent {
    pub fn finished(name: &str, duration: Duration) -> Self {
        TrialEvent::Finished {
            name: name.to_string(),
            duration_ms: duration.as_millis(),
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            TrialEvent::TrialCount { .. } => None,
            TrialEvent::Started { name }
            | TrialEvent::Ignored { name, .. }
            | TrialEvent::Failed { name, .. }
            | TrialEvent::Finished { name, .. } => Some(name),
        }
    }
}
