//! The simulation host: owns every node, module, and the global event queue.
//!
//! `SimHost` is the single-threaded coordinator. It advances simulated time
//! by popping the earliest event from the queue, context-switches the target
//! node in, invokes the plugin callback, and switches the node back out
//! before touching the next event. Plugins never see the host directly; they
//! reach it through the dispatch gateway while their node is active.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use tracing::instrument;

use crate::context::ContextSwitch;
use crate::directory::{self, AddressRecord, NameDirectory};
use crate::error::{HostError, HostResult};
use crate::events::{Event, EventQueue, ScheduledEvent};
use crate::gateway::{LogLevel, PluginCtx, Reply, Request};
use crate::globals::{NodeSnapshot, RegionId};
use crate::module::{ModuleDef, ModuleId, ModuleState, TimerCallback};
use crate::node::{NodeConfig, NodeId, VirtualNode};
use crate::sockets::SocketId;
use crate::timer::TimerId;

/// The execution substrate for virtual nodes of loaded plugin modules.
#[derive(Debug)]
pub struct SimHost {
    current_time: Duration,
    queue: EventQueue,
    next_sequence: u64,
    modules: Vec<ModuleState>,
    nodes: BTreeMap<NodeId, VirtualNode>,
    next_node_id: u64,
    directory: NameDirectory,
    context: ContextSwitch,
    loopexit: Option<TimerCallback>,
    loopexit_fired: bool,
    shutdown_requested: bool,
    in_module_init: bool,
    events_processed: u64,
}

impl SimHost {
    /// Creates an empty host at simulated time zero.
    pub fn new() -> Self {
        Self {
            current_time: Duration::ZERO,
            queue: EventQueue::new(),
            next_sequence: 0,
            modules: Vec::new(),
            nodes: BTreeMap::new(),
            next_node_id: 0,
            directory: NameDirectory::new(),
            context: ContextSwitch::default(),
            loopexit: None,
            loopexit_fired: false,
            shutdown_requested: false,
            in_module_init: false,
            events_processed: 0,
        }
    }

    // ---- module and node lifecycle ----

    /// Records a loaded module's entry points and returns its handle.
    ///
    /// The module's `module_init` runs later, when its first node is
    /// instantiated.
    pub fn load_module(&mut self, def: ModuleDef) -> ModuleId {
        let id = ModuleId(self.modules.len());
        self.modules.push(ModuleState::new(def));
        tracing::debug!(module = id.0, "module loaded");
        id
    }

    /// Instantiates one virtual node of `module`.
    ///
    /// Registers the node's address record, then runs the module's
    /// initialization entry points under a full context switch:
    /// `module_init` first if this is the module's first node, then
    /// `node_init`. The node may call `exit` during init, in which case it is
    /// reaped before this returns.
    #[instrument(skip(self, config), fields(hostname = %config.hostname))]
    pub fn spawn_node(&mut self, module: ModuleId, config: NodeConfig) -> HostResult<NodeId> {
        let state = self
            .modules
            .get(module.0)
            .ok_or(HostError::UnknownModule(module))?;
        let def = state.def;
        let first_node = !state.initialized;

        let snapshot = if state.globals.is_registered() {
            state.globals.seed_snapshot()
        } else {
            NodeSnapshot::pending()
        };

        self.directory.insert(AddressRecord {
            hostname: config.hostname.clone(),
            addr: config.addr,
            min_bandwidth_kbps: config.min_bandwidth_kbps(),
        })?;

        self.next_node_id += 1;
        let id = NodeId(self.next_node_id);
        self.nodes.insert(
            id,
            VirtualNode::new(module, config.hostname, config.addr, snapshot),
        );

        self.enter_node(id, |host, node| {
            if first_node {
                host.in_module_init = true;
                let mut ctx = PluginCtx::new(host, node);
                (def.module_init)(&mut ctx);
                host.in_module_init = false;
                if let Some(state) = host.modules.get_mut(module.0) {
                    state.globals.capture_initial();
                    state.initialized = true;
                }
            }
            let mut ctx = PluginCtx::new(host, node);
            (def.node_init)(&mut ctx);
        })?;

        self.reap_if_exited(id);
        Ok(id)
    }

    /// Tears a node down immediately, dropping its snapshot, timers, and
    /// sockets. Queue events that still reference it become stale and are
    /// skipped. The node's directory record is kept so its name remains
    /// resolvable, matching the behavior of a departed but configured host.
    pub fn remove_node(&mut self, node: NodeId) -> bool {
        let removed = self.nodes.remove(&node).is_some();
        if removed {
            tracing::debug!(node = node.0, "node torn down");
        }
        removed
    }

    /// Returns `true` while the node exists and has not been torn down.
    pub fn is_node_alive(&self, node: NodeId) -> bool {
        self.nodes.contains_key(&node)
    }

    /// Number of live nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// The node currently context-switched in, if any. Always `None` between
    /// events.
    pub fn active_node(&self) -> Option<NodeId> {
        self.context.active()
    }

    /// A node's stored snapshot bytes for one region.
    ///
    /// Core-side inspection; reflects the node's state as of its last
    /// deactivation.
    pub fn node_snapshot(&self, node: NodeId, region: RegionId) -> HostResult<&[u8]> {
        let state = self.nodes.get(&node).ok_or(HostError::UnknownNode(node))?;
        state
            .snapshot
            .region(region)
            .ok_or(HostError::UnknownRegion(region))
    }

    // ---- event loop ----

    /// Current simulated time.
    pub fn current_time(&self) -> Duration {
        self.current_time
    }

    /// Returns `true` if events are waiting to be processed.
    pub fn has_pending_events(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Number of events waiting to be processed.
    pub fn pending_event_count(&self) -> usize {
        self.queue.len()
    }

    /// Number of events processed so far.
    pub fn events_processed(&self) -> u64 {
        self.events_processed
    }

    /// Returns `true` once the dispatch loop has been asked to exit.
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested
    }

    /// Schedules an event `delay` after the current simulated time.
    pub fn schedule_event(&mut self, event: Event, delay: Duration) {
        let time = self.current_time + delay;
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.queue.schedule(ScheduledEvent::new(time, event, sequence));
    }

    /// Schedules a readiness change for a node's socket, as the transport
    /// simulation would.
    pub fn schedule_socket_status(
        &mut self,
        node: NodeId,
        socket: SocketId,
        readable: bool,
        writable: bool,
        delay: Duration,
    ) {
        self.schedule_event(
            Event::SocketStatus {
                node,
                socket,
                readable,
                writable,
            },
            delay,
        );
    }

    /// Schedules a loop-exit request at `delay` from now.
    pub fn schedule_shutdown(&mut self, delay: Duration) {
        self.schedule_event(Event::Shutdown, delay);
    }

    /// Asks the dispatch loop to exit, firing the loop-exit callback for
    /// every live node under a full context switch.
    pub fn request_shutdown(&mut self) {
        if self.shutdown_requested {
            return;
        }
        self.shutdown_requested = true;
        self.fire_loopexit();
    }

    /// Processes the next scheduled event and advances time.
    ///
    /// Returns `true` if more events remain afterwards.
    #[instrument(skip(self))]
    pub fn step(&mut self) -> bool {
        let Some(scheduled) = self.queue.pop_earliest() else {
            return false;
        };
        self.current_time = scheduled.time();
        self.events_processed += 1;

        match scheduled.into_event() {
            Event::TimerFired { node, timer } => self.fire_timer(node, timer),
            Event::SocketStatus {
                node,
                socket,
                readable,
                writable,
            } => self.apply_socket_status(node, socket, readable, writable),
            Event::Shutdown => self.request_shutdown(),
        }

        !self.queue.is_empty()
    }

    /// Processes events until the queue drains or shutdown is requested.
    pub fn run_until_empty(&mut self) {
        while !self.shutdown_requested && self.step() {}
        // A shutdown event may have been the last one in the queue.
        if self.shutdown_requested {
            tracing::debug!(time = ?self.current_time, "dispatch loop exited");
        }
    }

    fn fire_timer(&mut self, node: NodeId, timer: TimerId) {
        let Some(entry) = self
            .nodes
            .get_mut(&node)
            .and_then(|state| state.timers.take(timer))
        else {
            // Destroyed timer or torn-down node; the event is stale.
            tracing::trace!(node = node.0, timer = timer.0, "skipping stale timer event");
            return;
        };

        let result = self.enter_node(node, |host, node_id| {
            let mut ctx = PluginCtx::new(host, node_id);
            (entry.callback)(&mut ctx, timer, entry.arg);
        });
        if let Err(error) = result {
            // A fatal context error poisons only this node; its snapshot is
            // discarded and every other node's stored state is untouched.
            tracing::error!(node = node.0, %error, "context switch failed; aborting node");
            self.remove_node(node);
            return;
        }
        self.reap_if_exited(node);
    }

    fn apply_socket_status(
        &mut self,
        node: NodeId,
        socket: SocketId,
        readable: bool,
        writable: bool,
    ) {
        let outcome = self
            .nodes
            .get_mut(&node)
            .ok_or(HostError::UnknownNode(node))
            .and_then(|state| state.sockets.set_ready(socket, readable, writable));
        if outcome.is_err() {
            // Closed socket or torn-down node; the event is stale.
            tracing::trace!(node = node.0, socket = socket.0, "skipping stale socket event");
        }
    }

    fn fire_loopexit(&mut self) {
        if self.loopexit_fired {
            return;
        }
        self.loopexit_fired = true;
        let Some(callback) = self.loopexit else {
            return;
        };

        let ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        for id in ids {
            if !self.nodes.contains_key(&id) {
                continue;
            }
            let result = self.enter_node(id, |host, node| {
                let mut ctx = PluginCtx::new(host, node);
                callback(&mut ctx, TimerId::NONE, 0);
            });
            if let Err(error) = result {
                tracing::error!(node = id.0, %error, "context switch failed during loop exit");
                self.remove_node(id);
                continue;
            }
            self.reap_if_exited(id);
        }
    }

    fn reap_if_exited(&mut self, node: NodeId) {
        let exited = self
            .nodes
            .get(&node)
            .map(|state| state.exit_requested)
            .unwrap_or(false);
        if exited {
            self.remove_node(node);
        }
    }

    // ---- context switching ----

    /// Runs `f` with `node` context-switched in.
    ///
    /// Deactivation runs even when the callback panics, so the live regions
    /// are never left bound to a node across an unwind.
    fn enter_node<F>(&mut self, node: NodeId, f: F) -> HostResult<()>
    where
        F: FnOnce(&mut SimHost, NodeId),
    {
        self.activate(node)?;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| f(self, node)));
        let deactivated = self.deactivate(node);
        match outcome {
            Ok(()) => deactivated,
            Err(payload) => {
                if let Err(error) = deactivated {
                    tracing::error!(%error, "deactivate failed while unwinding plugin callback");
                }
                panic::resume_unwind(payload)
            }
        }
    }

    fn activate(&mut self, id: NodeId) -> HostResult<()> {
        let node = self.nodes.get(&id).ok_or(HostError::UnknownNode(id))?;
        let module = self
            .modules
            .get_mut(node.module.0)
            .ok_or(HostError::UnknownModule(node.module))?;
        self.context.activate(id, &mut module.globals, &node.snapshot)
    }

    fn deactivate(&mut self, id: NodeId) -> HostResult<()> {
        let node = self.nodes.get_mut(&id).ok_or(HostError::UnknownNode(id))?;
        let module = self
            .modules
            .get(node.module.0)
            .ok_or(HostError::UnknownModule(node.module))?;
        self.context.deactivate(id, &module.globals, &mut node.snapshot)
    }

    // ---- socket lifecycle (driven by the transport simulation) ----

    /// Opens a virtual socket bound to `port` on `node`.
    pub fn open_socket(&mut self, node: NodeId, port: u16) -> HostResult<SocketId> {
        let state = self.nodes.get_mut(&node).ok_or(HostError::UnknownNode(node))?;
        Ok(state.sockets.open(port))
    }

    /// Closes a node's socket. Pending readiness events for it become stale.
    pub fn close_socket(&mut self, node: NodeId, socket: SocketId) -> HostResult<bool> {
        let state = self.nodes.get_mut(&node).ok_or(HostError::UnknownNode(node))?;
        Ok(state.sockets.close(socket))
    }

    /// Sets a socket's readiness flags immediately.
    pub fn set_socket_ready(
        &mut self,
        node: NodeId,
        socket: SocketId,
        readable: bool,
        writable: bool,
    ) -> HostResult<()> {
        let state = self.nodes.get_mut(&node).ok_or(HostError::UnknownNode(node))?;
        state.sockets.set_ready(socket, readable, writable)
    }

    /// The naming and bandwidth directory.
    pub fn directory(&self) -> &NameDirectory {
        &self.directory
    }

    // ---- gateway dispatch ----

    /// Routes one plugin request.
    ///
    /// The calling node must be the active one; the gateway performs no
    /// context switching of its own.
    pub fn dispatch(&mut self, node: NodeId, request: Request<'_>) -> HostResult<Reply> {
        if self.context.active() != Some(node) {
            return Err(HostError::NotActive { requested: node });
        }

        match request {
            Request::GetTime => Ok(Reply::Time(self.current_time)),
            Request::TimerCreate {
                delay,
                callback,
                arg,
            } => {
                let expires_at = self.current_time + delay;
                let state = self.nodes.get_mut(&node).ok_or(HostError::UnknownNode(node))?;
                let timer = state.timers.create(expires_at, callback, arg);
                self.schedule_event(Event::TimerFired { node, timer }, delay);
                tracing::trace!(node = node.0, timer = timer.0, ?delay, "timer created");
                Ok(Reply::Timer(timer))
            }
            Request::TimerDestroy { timer } => {
                let state = self.nodes.get_mut(&node).ok_or(HostError::UnknownNode(node))?;
                if !state.timers.destroy(timer) {
                    tracing::trace!(node = node.0, timer = timer.0, "destroy of non-pending timer");
                }
                Ok(Reply::Unit)
            }
            Request::Exit => {
                let state = self.nodes.get_mut(&node).ok_or(HostError::UnknownNode(node))?;
                state.exit_requested = true;
                tracing::debug!(node = node.0, "node scheduled for teardown");
                Ok(Reply::Unit)
            }
            Request::Log { level, message } => {
                self.emit_log(node, level, message);
                Ok(Reply::Unit)
            }
            Request::LogBinary { level, data } => {
                let preview: String = data
                    .iter()
                    .take(16)
                    .map(|byte| format!("{byte:02x}"))
                    .collect();
                let text = format!("[{} bytes] {preview}", data.len());
                self.emit_log(node, level, &text);
                Ok(Reply::Unit)
            }
            Request::RegisterGlobals { sizes } => {
                if !self.in_module_init {
                    return Err(HostError::RegistrationOutsideInit);
                }
                let module = self.nodes.get(&node).ok_or(HostError::UnknownNode(node))?.module;
                let state = self
                    .modules
                    .get_mut(module.0)
                    .ok_or(HostError::UnknownModule(module))?;
                state.globals.register(sizes)?;
                tracing::debug!(
                    module = module.0,
                    regions = state.globals.region_count(),
                    bytes = state.globals.total_bytes(),
                    "globals registered"
                );
                Ok(Reply::Unit)
            }
            Request::SetLoopExit { callback } => {
                self.loopexit = Some(callback);
                Ok(Reply::Unit)
            }
            Request::ResolveName { name } => {
                Ok(Reply::Address(self.directory.resolve_name(name)?))
            }
            Request::ResolveAddr { addr, out } => {
                Ok(Reply::NameLength(self.directory.resolve_addr(addr, out)?))
            }
            Request::ResolveMinBandwidth { addr } => {
                Ok(Reply::Bandwidth(self.directory.min_bandwidth(addr)))
            }
            Request::GetAddress => {
                let state = self.nodes.get(&node).ok_or(HostError::UnknownNode(node))?;
                Ok(Reply::Address(state.addr))
            }
            Request::GetHostname { out } => {
                let state = self.nodes.get(&node).ok_or(HostError::UnknownNode(node))?;
                Ok(Reply::NameLength(directory::copy_name(&state.hostname, out)?))
            }
            Request::SocketReadable { socket } => {
                let state = self.nodes.get(&node).ok_or(HostError::UnknownNode(node))?;
                Ok(Reply::Readiness(state.sockets.is_readable(socket)?))
            }
            Request::SocketWritable { socket } => {
                let state = self.nodes.get(&node).ok_or(HostError::UnknownNode(node))?;
                Ok(Reply::Readiness(state.sockets.is_writable(socket)?))
            }
        }
    }

    pub(crate) fn active_region(&self, node: NodeId, region: RegionId) -> HostResult<&[u8]> {
        if self.context.active() != Some(node) {
            return Err(HostError::NotActive { requested: node });
        }
        let module = self.nodes.get(&node).ok_or(HostError::UnknownNode(node))?.module;
        let state = self
            .modules
            .get(module.0)
            .ok_or(HostError::UnknownModule(module))?;
        state.globals.region(region)
    }

    pub(crate) fn active_region_mut(
        &mut self,
        node: NodeId,
        region: RegionId,
    ) -> HostResult<&mut [u8]> {
        if self.context.active() != Some(node) {
            return Err(HostError::NotActive { requested: node });
        }
        let module = self.nodes.get(&node).ok_or(HostError::UnknownNode(node))?.module;
        let state = self
            .modules
            .get_mut(module.0)
            .ok_or(HostError::UnknownModule(module))?;
        state.globals.region_mut(region)
    }

    fn emit_log(&self, node: NodeId, level: LogLevel, message: &str) {
        let hostname = self
            .nodes
            .get(&node)
            .map(|state| state.hostname.as_str())
            .unwrap_or("?");
        match level {
            LogLevel::Error => tracing::error!(node = hostname, "{message}"),
            LogLevel::Warn => tracing::warn!(node = hostname, "{message}"),
            LogLevel::Info => tracing::info!(node = hostname, "{message}"),
            LogLevel::Debug => tracing::debug!(node = hostname, "{message}"),
            LogLevel::Trace => tracing::trace!(node = hostname, "{message}"),
        }
    }
}

impl Default for SimHost {
    fn default() -> Self {
        Self::new()
    }
}
