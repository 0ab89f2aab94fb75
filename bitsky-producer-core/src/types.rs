//! Wire types shared with the Metadata Service and target systems.
//!
//! The control plane owns most of these shapes; fields the producer never
//! interprets ride along in the flattened `extra` maps so updates echo the
//! full object back unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Remote producer state that permits job execution.
pub const PRODUCER_STATE_ACTIVE: &str = "ACTIVE";

/// Terminal states the producer writes onto an intelligence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IntelligenceState {
    Finished,
    Failed,
    Timeout,
}

impl IntelligenceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Finished => "FINISHED",
            Self::Failed => "FAILED",
            Self::Timeout => "TIMEOUT",
        }
    }
}

impl fmt::Display for IntelligenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `system` block of a remote producer config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProducerSystem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Remote producer configuration, as served by the Metadata Service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProducerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_id: Option<String>,
    /// Wire name `type`; `kind` in Rust to dodge the keyword.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub system: ProducerSystem,
    /// Job-loop interval in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub polling_interval: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProducerConfig {
    /// Identity used for change detection: `(globalId, system.version)`.
    pub fn identity(&self) -> (Option<&str>, Option<&str>) {
        (self.global_id.as_deref(), self.system.version.as_deref())
    }

    /// Whether the remote state permits job execution.
    pub fn is_active(&self) -> bool {
        self.system
            .state
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case(PRODUCER_STATE_ACTIVE))
    }
}

/// Callback descriptor inside an SOI block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SoiCallback {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// System Of Interest: where an intelligence's result is delivered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Soi {
    #[serde(rename = "baseURL", skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback: Option<SoiCallback>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Soi {
    pub fn callback_method(&self) -> Option<&str> {
        self.callback.as_ref().and_then(|c| c.method.as_deref())
    }

    pub fn callback_path(&self) -> Option<&str> {
        self.callback.as_ref().and_then(|c| c.path.as_deref())
    }
}

/// Producer stamps on an intelligence's `system` block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProducerStamp {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `system` block of an intelligence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IntelligenceSystem {
    /// Loosely typed on the wire; the control plane owns non-terminal
    /// states, the producer only ever writes terminal ones.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failures_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub producer: Option<ProducerStamp>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One unit of work.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Intelligence {
    pub global_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub soi: Option<Soi>,
    pub system: IntelligenceSystem,
    /// Opaque payload produced by the worker.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Intelligence {
    /// Current `system.state`, if any.
    pub fn state(&self) -> Option<&str> {
        self.system.state.as_deref()
    }

    /// Whether the state is one of the producer-written terminal states.
    pub fn has_terminal_state(&self) -> bool {
        self.state().is_some_and(|s| {
            s == IntelligenceState::Finished.as_str()
                || s == IntelligenceState::Failed.as_str()
                || s == IntelligenceState::Timeout.as_str()
        })
    }

    /// Whether the worker attached a usable dataset.
    pub fn has_dataset(&self) -> bool {
        self.dataset.as_ref().is_some_and(|v| !v.is_null())
    }

    /// Write a terminal state onto the item.
    ///
    /// Uppercases the state, stamps `system.producer.endedAt` with the
    /// current time, and records `reason` (when given) into
    /// `system.failuresReason`: a JSON string is taken verbatim, any other
    /// value is serialized to its compact JSON text.
    pub fn set_state(&mut self, state: IntelligenceState, reason: Option<&Value>) {
        self.system.state = Some(state.as_str().to_string());
        self.system
            .producer
            .get_or_insert_with(ProducerStamp::default)
            .ended_at = Some(Utc::now());
        if let Some(reason) = reason {
            self.system.failures_reason = Some(render_reason(reason));
        }
    }
}

/// Flatten a failure reason to the string form stored on the wire.
pub fn render_reason(reason: &Value) -> String {
    match reason {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
