use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
    pub last_transition_time: DateTime<Utc>,
}

/// A sub-document per (resource, named reconciler) pair. Created on first
/// touch, updated on every sync attempt — see `SPEC_FULL.md` §3.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default)]
pub struct ControllerRecord {
    pub resource_id: String,
    pub controller_name: String,
    pub conditions: Vec<Condition>,
}

impl ControllerRecord {
    pub fn new(resource_id: impl Into<String>, controller_name: impl Into<String>) -> Self {
        ControllerRecord {
            resource_id: resource_id.into(),
            controller_name: controller_name.into(),
            conditions: Vec::new(),
        }
    }

    /// Inserts or replaces the condition of the given `type_`.
    pub fn set_condition(&mut self, condition: Condition) {
        if let Some(existing) = self
            .conditions
            .iter_mut()
            .find(|c| c.type_ == condition.type_)
        {
            *existing = condition;
        } else {
            self.conditions.push(condition);
        }
    }
}
