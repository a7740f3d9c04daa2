//! Loaded plugin modules.
//!
//! The loader/linker that maps module code into memory is out of scope; a
//! module arrives here as a set of entry points. State lives in the module's
//! registered global regions, never in the entry points themselves, which is
//! what makes the per-node snapshot discipline sufficient for isolation.

use crate::gateway::PluginCtx;
use crate::globals::ModuleGlobals;
use crate::timer::TimerId;

/// Stable handle for a loaded module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(pub usize);

/// Entry point invoked by the host during initialization.
pub type PluginInitFn = fn(&mut PluginCtx<'_>);

/// Callback invoked when a timer expires, and for loop exit.
///
/// Receives the firing timer's id ([`TimerId::NONE`] for loop exit) and the
/// opaque argument word supplied at creation.
pub type TimerCallback = fn(&mut PluginCtx<'_>, TimerId, u64);

/// The recognized entry points of a plugin module.
///
/// `module_init` runs exactly once per module, during the instantiation of
/// its first node, and is the only place global regions may be registered.
/// `node_init` runs once per node instantiation, after `module_init` on the
/// first node.
#[derive(Debug, Clone, Copy)]
pub struct ModuleDef {
    /// Once-per-module initialization; registers global regions and writes
    /// their initial values.
    pub module_init: PluginInitFn,
    /// Once-per-node initialization; typically creates the node's first
    /// timers and sockets.
    pub node_init: PluginInitFn,
}

/// Host-side state for one loaded module.
#[derive(Debug)]
pub(crate) struct ModuleState {
    pub(crate) def: ModuleDef,
    pub(crate) globals: ModuleGlobals,
    pub(crate) initialized: bool,
}

impl ModuleState {
    pub(crate) fn new(def: ModuleDef) -> Self {
        Self {
            def,
            globals: ModuleGlobals::new(),
            initialized: false,
        }
    }
}
