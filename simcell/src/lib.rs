//! # Simcell
//!
//! An execution substrate that lets a single host process run many
//! independent virtual nodes of one loaded plugin module, each believing it
//! owns a private process with its own clock, sockets, and name resolution,
//! while a discrete-event core actually drives time and I/O.
//!
//! The substrate provides:
//! - per-node snapshot isolation of a module's registered global state,
//!   restored and captured around every plugin callback;
//! - virtual timers scheduled on a single deterministic event queue, with
//!   same-timestamp events firing in creation order;
//! - virtualized socket readiness and hostname/address/bandwidth resolution;
//! - a single dispatch gateway through which all plugin-to-core requests flow.
//!
//! ## Example
//!
//! ```rust
//! use simcell::{LogLevel, ModuleDef, NodeConfig, PluginCtx, RegionId, SimHost};
//! use std::time::Duration;
//!
//! fn module_init(ctx: &mut PluginCtx<'_>) {
//!     ctx.register_globals(&[4]).expect("register once per module");
//! }
//!
//! fn node_init(ctx: &mut PluginCtx<'_>) {
//!     ctx.log(LogLevel::Info, "node up").expect("log");
//!     ctx.timer_create(Duration::from_millis(100), on_tick, 7)
//!         .expect("create timer");
//! }
//!
//! fn on_tick(ctx: &mut PluginCtx<'_>, _timer: simcell::TimerId, arg: u64) {
//!     let region = ctx.region_mut(RegionId(0)).expect("region");
//!     region.copy_from_slice(&(arg as u32).to_le_bytes());
//! }
//!
//! let mut host = SimHost::new();
//! let module = host.load_module(ModuleDef { module_init, node_init });
//! let node = host
//!     .spawn_node(
//!         module,
//!         NodeConfig {
//!             hostname: "relay1".to_string(),
//!             addr: "10.0.0.1".parse().expect("addr"),
//!             upload_kbps: 500,
//!             download_kbps: 800,
//!         },
//!     )
//!     .expect("spawn");
//!
//! host.run_until_empty();
//! assert_eq!(host.current_time(), Duration::from_millis(100));
//! assert_eq!(
//!     host.node_snapshot(node, RegionId(0)).expect("snapshot"),
//!     7u32.to_le_bytes()
//! );
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

mod context;
/// Hostname, address, and bandwidth resolution.
pub mod directory;
/// Error types and utilities for substrate operations.
pub mod error;
/// Event scheduling and processing for the dispatch loop.
pub mod events;
/// The dispatch gateway between plugins and the core.
pub mod gateway;
/// Registered global state and per-node snapshots.
pub mod globals;
/// The simulation host and its dispatch loop.
pub mod host;
/// Loaded plugin modules and their entry points.
pub mod module;
/// Virtual nodes and their configuration.
pub mod node;
/// Per-node virtual sockets.
pub mod sockets;
/// Per-node virtual timers.
pub mod timer;

// Public API exports
pub use directory::{AddressRecord, NameDirectory};
pub use error::{HostError, HostResult};
pub use events::{Event, EventQueue, ScheduledEvent};
pub use gateway::{LogLevel, PluginCtx, Reply, Request};
pub use globals::{ModuleGlobals, NodeSnapshot, RegionId};
pub use host::SimHost;
pub use module::{ModuleDef, ModuleId, PluginInitFn, TimerCallback};
pub use node::{NodeConfig, NodeId};
pub use sockets::{SocketId, SocketTable, VirtualSocket};
pub use timer::{TimerEntry, TimerId, TimerTable};
