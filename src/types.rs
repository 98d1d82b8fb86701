//! Data structures shared by the refresh pipeline.
//!
//! [`Task`] is a snapshot of what the orchestrator reports about one
//! replica.  The pipeline narrows tasks down to [`Candidate`]s, asks each
//! candidate for its public key and turns the answers into
//! [`PeerRecord`]s.  Candidates and peer records only live for a single
//! refresh cycle.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a swarm task, as reported by the Docker Engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    New,
    Allocated,
    Pending,
    Assigned,
    Accepted,
    Preparing,
    Ready,
    Starting,
    Running,
    Complete,
    Shutdown,
    Failed,
    Rejected,
    Remove,
    Orphaned,
    /// Any state introduced by a newer engine.
    #[serde(other)]
    Unknown,
}

/// Attachment of a task to one network.  `addresses` keep the
/// `ip/prefix` form the engine hands out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkAttachment {
    pub network: String,
    pub addresses: Vec<String>,
}

/// One orchestrator task, treated as an immutable snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: String,
    pub desired_state: TaskState,
    pub state: TaskState,
    pub attachments: Vec<NetworkAttachment>,
}

impl Task {
    pub fn is_running(&self) -> bool {
        self.desired_state == TaskState::Running && self.state == TaskState::Running
    }
}

/// A peer address eligible for a key lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub task_id: String,
    pub ip: IpAddr,
}

/// A candidate that answered with its public key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct PeerRecord {
    pub ip: IpAddr,
    pub public_key: String,
}
