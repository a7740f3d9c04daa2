//! Registered global state and per-node snapshots.
//!
//! A module's mutable global state is modeled as a set of host-owned byte
//! regions: one live copy shared by every node of the module, plus one
//! snapshot per node. The context-switch manager copies a node's snapshot
//! into the live regions before any plugin callback runs on its behalf and
//! copies the live regions back afterwards, so each node observes private
//! globals without owning a private address space. The cost is an
//! O(total registered bytes) copy per call boundary, accepted deliberately.

use crate::error::{HostError, HostResult};

/// Identifies one registered global region of a module.
///
/// Regions are numbered in registration order, starting at 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionId(pub usize);

/// The registered global regions of one loaded module.
///
/// Holds the live buffers that plugin callbacks read and write, and the
/// pristine initial image captured at the end of module initialization,
/// which seeds the snapshot of every node created afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleGlobals {
    live: Vec<Vec<u8>>,
    initial: Vec<Vec<u8>>,
    registered: bool,
}

impl ModuleGlobals {
    /// Creates the empty, not-yet-registered state for a freshly loaded module.
    pub fn new() -> Self {
        Self {
            live: Vec::new(),
            initial: Vec::new(),
            registered: false,
        }
    }

    /// Records the module's region layout, allocating zeroed live buffers.
    ///
    /// May be called at most once per module. Zero-length regions are a
    /// configuration error. The layout is frozen afterwards; a module must
    /// not change it for its remaining lifetime.
    pub fn register(&mut self, sizes: &[usize]) -> HostResult<()> {
        if self.registered {
            return Err(HostError::GlobalsAlreadyRegistered);
        }
        for (index, &size) in sizes.iter().enumerate() {
            if size == 0 {
                return Err(HostError::EmptyRegion { index });
            }
        }

        self.live = sizes.iter().map(|&size| vec![0u8; size]).collect();
        self.registered = true;
        Ok(())
    }

    /// Returns `true` once [`register`](Self::register) has succeeded.
    pub fn is_registered(&self) -> bool {
        self.registered
    }

    /// Number of registered regions.
    pub fn region_count(&self) -> usize {
        self.live.len()
    }

    /// Total bytes across all registered regions.
    pub fn total_bytes(&self) -> usize {
        self.live.iter().map(Vec::len).sum()
    }

    /// Captures the current live bytes as the module's initial image.
    ///
    /// Called once, right after the module initialization callback returns,
    /// so that per-node writes made later never leak into the seed of
    /// freshly created nodes.
    pub fn capture_initial(&mut self) {
        self.initial = self.live.clone();
    }

    /// Builds a snapshot seeded from the module's initial image.
    pub fn seed_snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            regions: Some(self.initial.clone()),
        }
    }

    /// Copies a node's snapshot into the live regions.
    ///
    /// A pending snapshot (never captured yet) loads nothing; that state only
    /// exists for the first node of a module, before registration. Any size
    /// difference between a captured snapshot and the registered layout is a
    /// fatal configuration error.
    pub fn load(&mut self, snapshot: &NodeSnapshot) -> HostResult<()> {
        let Some(regions) = &snapshot.regions else {
            return Ok(());
        };
        self.check_layout(regions)?;
        for (live, stored) in self.live.iter_mut().zip(regions) {
            live.copy_from_slice(stored);
        }
        Ok(())
    }

    /// Copies the live regions back into a node's snapshot.
    ///
    /// A pending snapshot takes the full live image; this is how the first
    /// node of a module acquires its layout. A captured snapshot must match
    /// the registered layout exactly.
    pub fn store(&self, snapshot: &mut NodeSnapshot) -> HostResult<()> {
        match &mut snapshot.regions {
            None => {
                snapshot.regions = Some(self.live.clone());
            }
            Some(regions) => {
                self.check_layout(regions)?;
                for (stored, live) in regions.iter_mut().zip(&self.live) {
                    stored.copy_from_slice(live);
                }
            }
        }
        Ok(())
    }

    /// Read access to a live region.
    pub fn region(&self, id: RegionId) -> HostResult<&[u8]> {
        self.live
            .get(id.0)
            .map(Vec::as_slice)
            .ok_or(HostError::UnknownRegion(id))
    }

    /// Write access to a live region.
    pub fn region_mut(&mut self, id: RegionId) -> HostResult<&mut [u8]> {
        self.live
            .get_mut(id.0)
            .map(Vec::as_mut_slice)
            .ok_or(HostError::UnknownRegion(id))
    }

    fn check_layout(&self, regions: &[Vec<u8>]) -> HostResult<()> {
        let matches = regions.len() == self.live.len()
            && regions
                .iter()
                .zip(&self.live)
                .all(|(stored, live)| stored.len() == live.len());
        if matches {
            Ok(())
        } else {
            Err(HostError::LayoutMismatch {
                snapshot: regions.iter().map(Vec::len).sum(),
                registered: self.total_bytes(),
            })
        }
    }
}

impl Default for ModuleGlobals {
    fn default() -> Self {
        Self::new()
    }
}

/// One node's private byte-for-byte image of its module's global regions.
///
/// Starts out pending for the first node of a module (created before the
/// module registers its layout) and becomes captured on the node's first
/// deactivation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSnapshot {
    regions: Option<Vec<Vec<u8>>>,
}

impl NodeSnapshot {
    /// A snapshot that has not captured any layout yet.
    pub fn pending() -> Self {
        Self { regions: None }
    }

    /// Returns `true` until the snapshot first captures the live regions.
    pub fn is_pending(&self) -> bool {
        self.regions.is_none()
    }

    /// The stored bytes of one region, if captured.
    pub fn region(&self, id: RegionId) -> Option<&[u8]> {
        self.regions
            .as_ref()
            .and_then(|regions| regions.get(id.0))
            .map(Vec::as_slice)
    }

    /// Total bytes held by the snapshot.
    pub fn total_bytes(&self) -> usize {
        self.regions
            .as_ref()
            .map(|regions| regions.iter().map(Vec::len).sum())
            .unwrap_or(0)
    }
}
