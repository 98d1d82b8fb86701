//! Narrows orchestrator tasks down to peer candidates.

use std::net::IpAddr;

use log::{debug, error};

use crate::error::AddressError;
use crate::types::{Candidate, Task};

/// Selects running tasks attached to the target network.
#[derive(Debug, Clone)]
pub struct TaskFilter {
    network: String,
}

impl TaskFilter {
    pub fn new(network: impl Into<String>) -> Self {
        Self {
            network: network.into(),
        }
    }

    /// Produces at most one candidate per task.  Tasks that are not
    /// running, not on the network, or carry an unparsable address are
    /// skipped.
    pub fn candidates(&self, tasks: &[Task]) -> Vec<Candidate> {
        let mut out = Vec::new();
        for task in tasks {
            if !task.is_running() {
                debug!("Skipping task {}: not running", task.id);
                continue;
            }

            let address = task
                .attachments
                .iter()
                .find(|a| a.network == self.network && !a.addresses.is_empty())
                .and_then(|a| a.addresses.first());
            let Some(address) = address else {
                continue;
            };

            match parse_address(address) {
                Ok(ip) => out.push(Candidate {
                    task_id: task.id.clone(),
                    ip,
                }),
                Err(e) => error!("Skipping task {}: {}", task.id, e),
            }
        }
        out
    }
}

/// Parses `ip` or `ip/prefix`, dropping the prefix.
pub fn parse_address(address: &str) -> Result<IpAddr, AddressError> {
    let invalid = || AddressError(address.to_string());
    let (ip, prefix) = match address.split_once('/') {
        Some((ip, prefix)) => (ip, Some(prefix)),
        None => (address, None),
    };
    let ip: IpAddr = ip.parse().map_err(|_| invalid())?;
    if let Some(prefix) = prefix {
        let max = if ip.is_ipv4() { 32 } else { 128 };
        match prefix.parse::<u8>() {
            Ok(bits) if bits <= max => {}
            _ => return Err(invalid()),
        }
    }
    Ok(ip)
}
