//! Core data model.
//!
//! A work item is something that needs doing. It is created by a supervisor,
//! claimed by an agent, and eventually completed. Every change to an item is
//! recorded as an immutable [`WorkAction`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

// ---------------------------------------------------------------------------
// Work Item
// ---------------------------------------------------------------------------

/// A unit of work tracked by the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    /// Assigned by storage on first insert. Assignment order is creation order.
    pub id: WorkId,

    /// Free text supplied by the supervisor.
    pub title: String,

    /// Current lifecycle status.
    pub status: WorkStatus,

    /// The agent that last claimed, assigned, or completed this item.
    /// Empty only while the item is `New`.
    pub assigned_to: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Newtype for work item IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkId(pub i64);

impl std::fmt::Display for WorkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for WorkId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim_start_matches('#')
            .parse::<i64>()
            .map(WorkId)
            .map_err(|_| Error::InvalidInput(format!("invalid work item id: {s}")))
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkStatus {
    /// Created, waiting to be claimed.
    New,
    /// Claimed by an agent.
    Assigned,
    /// Done.
    Completed,
}

impl WorkStatus {
    pub const ALL: [WorkStatus; 3] = [
        WorkStatus::New,
        WorkStatus::Assigned,
        WorkStatus::Completed,
    ];

    /// Can transition from self to `to` under strict lifecycle enforcement?
    ///
    /// The default queue policy does not consult this; see
    /// [`LifecyclePolicy`](crate::queue::LifecyclePolicy).
    pub fn can_transition_to(self, to: WorkStatus) -> bool {
        use WorkStatus::*;
        matches!((self, to), (New, Assigned) | (Assigned, Completed))
    }

    /// The status a strict transition into `to` must start from, if any.
    /// The strict graph has at most one predecessor per status.
    pub(crate) fn strict_predecessor(to: WorkStatus) -> Option<WorkStatus> {
        Self::ALL.into_iter().find(|from| from.can_transition_to(to))
    }

    /// Storage representation.
    pub fn as_str(self) -> &'static str {
        match self {
            WorkStatus::New => "new",
            WorkStatus::Assigned => "assigned",
            WorkStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for WorkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WorkStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "new" => Ok(WorkStatus::New),
            "assigned" => Ok(WorkStatus::Assigned),
            "completed" => Ok(WorkStatus::Completed),
            _ => Err(Error::InvalidInput(format!("unknown status: {s}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Audit trail
// ---------------------------------------------------------------------------

/// Newtype for audit record IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(pub i64);

impl std::fmt::Display for ActionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What kind of transition an audit record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    Create,
    Assign,
    Complete,
    /// Claimed through the "next available" path.
    AssignNext,
}

impl ActionType {
    /// Storage representation.
    pub fn as_str(self) -> &'static str {
        match self {
            ActionType::Create => "create",
            ActionType::Assign => "assign",
            ActionType::Complete => "complete",
            ActionType::AssignNext => "assign_next",
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "create" => Ok(ActionType::Create),
            "assign" => Ok(ActionType::Assign),
            "complete" => Ok(ActionType::Complete),
            "assign_next" => Ok(ActionType::AssignNext),
            _ => Err(Error::Other(format!("unknown action type: {s}"))),
        }
    }
}

/// An immutable audit fact: who did what to which item, and when.
///
/// `work_item_id` is a plain back-reference. Resolve it through the item
/// store when the item itself is needed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkAction {
    pub id: ActionId,
    pub work_item_id: WorkId,
    pub action_type: ActionType,
    /// Supervisor for `Create`, agent otherwise.
    pub actor: String,
    pub occurred_at: DateTime<Utc>,
}
