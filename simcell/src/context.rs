//! The context-switch discipline around plugin callbacks.
//!
//! Exactly one node may be bound to a module's live regions at a time,
//! process-wide. Every plugin entry point runs inside a strictly nested
//! activate/deactivate pair; the pairs never interleave because the dispatch
//! loop is single-threaded and cooperative. Gateway calls made from inside a
//! callback run while the node is already active and perform no switching of
//! their own.

use crate::error::{HostError, HostResult};
use crate::globals::{ModuleGlobals, NodeSnapshot};
use crate::node::NodeId;

/// Tracks the single active-node slot and performs the snapshot copies.
#[derive(Debug, Default)]
pub(crate) struct ContextSwitch {
    active: Option<NodeId>,
}

impl ContextSwitch {
    /// The node currently bound to the live regions, if any.
    pub(crate) fn active(&self) -> Option<NodeId> {
        self.active
    }

    /// Binds `node` to the live regions, restoring its snapshot.
    ///
    /// Activating while another node is active is a contract violation and
    /// fatal; so is a snapshot that no longer matches the registered layout.
    pub(crate) fn activate(
        &mut self,
        node: NodeId,
        globals: &mut ModuleGlobals,
        snapshot: &NodeSnapshot,
    ) -> HostResult<()> {
        if let Some(active) = self.active {
            return Err(HostError::ActivationConflict {
                active,
                requested: node,
            });
        }
        globals.load(snapshot)?;
        self.active = Some(node);
        Ok(())
    }

    /// Captures the live regions back into `node`'s snapshot and frees the slot.
    pub(crate) fn deactivate(
        &mut self,
        node: NodeId,
        globals: &ModuleGlobals,
        snapshot: &mut NodeSnapshot,
    ) -> HostResult<()> {
        if self.active != Some(node) {
            return Err(HostError::NotActive { requested: node });
        }
        globals.store(snapshot)?;
        self.active = None;
        Ok(())
    }
}
