//! Dashboard snapshot shape.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::events::EventType;
use crate::user::{SelectedPlan, User};

/// Funnel steps in order.
pub const FUNNEL_STEPS: [EventType; 4] = [
    EventType::PageView,
    EventType::DemoRequested,
    EventType::PlanSelected,
    EventType::SignupCompleted,
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunnelStep {
    pub event: String,
    pub count: u64,
}

/// Aggregate view served by `GET /analytics`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    pub total_users: u64,
    pub unique_visitors: u64,
    pub funnel: Vec<FunnelStep>,
    pub plan_distribution: BTreeMap<SelectedPlan, u64>,
    pub recent_users: Vec<User>,
    pub status: SnapshotStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotStatus {
    Live,
    Unavailable,
}

impl DashboardSnapshot {
    /// Static payload served when the store cannot be read.
    pub fn placeholder() -> Self {
        Self {
            total_users: 0,
            unique_visitors: 0,
            funnel: FUNNEL_STEPS
                .iter()
                .map(|step| FunnelStep {
                    event: step.as_str().to_string(),
                    count: 0,
                })
                .collect(),
            plan_distribution: SelectedPlan::ALL.iter().map(|p| (*p, 0)).collect(),
            recent_users: Vec::new(),
            status: SnapshotStatus::Unavailable,
        }
    }
}
