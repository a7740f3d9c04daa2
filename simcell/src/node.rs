//! Virtual nodes: one simulated host per instance of a loaded module.

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::globals::NodeSnapshot;
use crate::module::ModuleId;
use crate::sockets::SocketTable;
use crate::timer::TimerTable;

/// Identifies a virtual node. Ids are monotonic and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

/// Configuration for instantiating one virtual node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Hostname, unique within the simulation.
    pub hostname: String,
    /// Virtual IPv4 address, unique within the simulation.
    pub addr: Ipv4Addr,
    /// Configured upload bandwidth in KB/s.
    pub upload_kbps: u32,
    /// Configured download bandwidth in KB/s.
    pub download_kbps: u32,
}

impl NodeConfig {
    /// The minimum of the configured upload and download bandwidth, which is
    /// what the resolver reports.
    pub fn min_bandwidth_kbps(&self) -> u32 {
        self.upload_kbps.min(self.download_kbps)
    }
}

/// Host-side state for one live virtual node.
///
/// Owned exclusively by the host; a plugin only ever reaches it through the
/// dispatch gateway while the node is active.
#[derive(Debug)]
pub(crate) struct VirtualNode {
    pub(crate) module: ModuleId,
    pub(crate) hostname: String,
    pub(crate) addr: Ipv4Addr,
    pub(crate) snapshot: NodeSnapshot,
    pub(crate) timers: TimerTable,
    pub(crate) sockets: SocketTable,
    /// Set by the `exit` gateway call; the node is reaped after the current
    /// callback returns, never mid-callback.
    pub(crate) exit_requested: bool,
}

impl VirtualNode {
    pub(crate) fn new(
        module: ModuleId,
        hostname: String,
        addr: Ipv4Addr,
        snapshot: NodeSnapshot,
    ) -> Self {
        Self {
            module,
            hostname,
            addr,
            snapshot,
            timers: TimerTable::default(),
            sockets: SocketTable::default(),
            exit_requested: false,
        }
    }
}
