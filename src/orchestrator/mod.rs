use crate::types::Task;
use anyhow::Result;
use async_trait::async_trait;

pub mod swarm;
pub use swarm::SwarmOrchestrator;

#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// List the tasks of the given services whose desired state is
    /// `running`.  Observed state is not filtered here.
    async fn running_tasks(&self, services: &[String]) -> Result<Vec<Task>>;
}
