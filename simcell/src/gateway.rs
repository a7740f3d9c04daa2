//! The dispatch gateway: the single call surface from plugin to core.
//!
//! Every request a plugin makes while one of its callbacks is running goes
//! through [`PluginCtx`], which routes a tagged [`Request`] to the host's
//! dispatcher. The gateway performs no context switching of its own: it runs
//! while the calling node is already active, validates the request, and hands
//! back a [`Reply`] or a recoverable error. The typed wrapper methods exist
//! so plugin code never has to match reply variants by hand.

use std::net::Ipv4Addr;
use std::time::Duration;

use crate::error::{HostError, HostResult};
use crate::globals::RegionId;
use crate::host::SimHost;
use crate::module::TimerCallback;
use crate::node::NodeId;
use crate::sockets::SocketId;
use crate::timer::TimerId;

/// Severity scale for plugin log requests, mapped onto the tracing stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Unrecoverable plugin-side failures.
    Error,
    /// Suspicious but survivable conditions.
    Warn,
    /// Regular progress messages.
    Info,
    /// Verbose diagnostics.
    Debug,
    /// Per-event diagnostics.
    Trace,
}

/// A plugin-to-core request.
///
/// One variant per operation of the boundary surface; the host validates the
/// variant and routes it to the matching handler.
#[derive(Debug)]
pub enum Request<'a> {
    /// Current simulated time.
    GetTime,
    /// Create a one-shot timer expiring `delay` from now.
    TimerCreate {
        /// Delay until expiry.
        delay: Duration,
        /// Invoked once on expiry.
        callback: TimerCallback,
        /// Opaque argument handed back to the callback.
        arg: u64,
    },
    /// Destroy a pending timer. A no-op for fired or unknown ids.
    TimerDestroy {
        /// The timer to destroy.
        timer: TimerId,
    },
    /// Schedule the calling node for teardown after the current callback
    /// returns. Calling twice is a no-op.
    Exit,
    /// Log a message at the given level.
    Log {
        /// Severity.
        level: LogLevel,
        /// Message text.
        message: &'a str,
    },
    /// Log binary data at the given level.
    LogBinary {
        /// Severity.
        level: LogLevel,
        /// Raw bytes; a bounded hex preview is logged.
        data: &'a [u8],
    },
    /// Register the module's global regions. Permitted only during module
    /// initialization, once per module.
    RegisterGlobals {
        /// Byte length of each region, in registration order.
        sizes: &'a [usize],
    },
    /// Install the process-wide loop-exit callback. Last write wins.
    SetLoopExit {
        /// Invoked when the dispatch loop is asked to exit.
        callback: TimerCallback,
    },
    /// Resolve a hostname to its virtual address.
    ResolveName {
        /// Hostname to look up.
        name: &'a str,
    },
    /// Resolve a virtual address to its hostname, written into `out`.
    ResolveAddr {
        /// Address to look up.
        addr: Ipv4Addr,
        /// Receives the hostname bytes; too small a buffer is a capacity
        /// error, distinct from not-found.
        out: &'a mut [u8],
    },
    /// Minimum configured bandwidth for an address; 0 when unmapped.
    ResolveMinBandwidth {
        /// Address to look up.
        addr: Ipv4Addr,
    },
    /// The calling node's own virtual address.
    GetAddress,
    /// The calling node's own hostname, written into `out` under the same
    /// capacity contract as `ResolveAddr`.
    GetHostname {
        /// Receives the hostname bytes.
        out: &'a mut [u8],
    },
    /// Whether a virtual socket has data ready to read.
    SocketReadable {
        /// Descriptor to query.
        socket: SocketId,
    },
    /// Whether a virtual socket can accept writes.
    SocketWritable {
        /// Descriptor to query.
        socket: SocketId,
    },
}

/// A successful gateway reply.
///
/// Most operations reply [`Reply::Unit`]; resolution and timer creation carry
/// richer values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// Operation completed with nothing further to report.
    Unit,
    /// Current simulated time.
    Time(Duration),
    /// The created timer's id.
    Timer(TimerId),
    /// A resolved virtual address.
    Address(Ipv4Addr),
    /// Bytes written for a resolved name.
    NameLength(usize),
    /// Bandwidth in KB/s.
    Bandwidth(u32),
    /// Socket readiness flag.
    Readiness(bool),
}

/// A plugin's handle back into the core for the duration of one callback.
///
/// Exists only while its node is active; everything it can reach is scoped
/// to that node, so a module can never address another node's state.
#[derive(Debug)]
pub struct PluginCtx<'a> {
    host: &'a mut SimHost,
    node: NodeId,
}

impl<'a> PluginCtx<'a> {
    pub(crate) fn new(host: &'a mut SimHost, node: NodeId) -> Self {
        Self { host, node }
    }

    /// The calling node's id.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Issues a raw request through the gateway.
    pub fn call(&mut self, request: Request<'_>) -> HostResult<Reply> {
        self.host.dispatch(self.node, request)
    }

    /// Current simulated time.
    pub fn gettime(&mut self) -> HostResult<Duration> {
        match self.call(Request::GetTime)? {
            Reply::Time(time) => Ok(time),
            _ => Err(HostError::UnexpectedReply),
        }
    }

    /// Creates a one-shot timer expiring `delay` from now.
    pub fn timer_create(
        &mut self,
        delay: Duration,
        callback: TimerCallback,
        arg: u64,
    ) -> HostResult<TimerId> {
        match self.call(Request::TimerCreate {
            delay,
            callback,
            arg,
        })? {
            Reply::Timer(id) => Ok(id),
            _ => Err(HostError::UnexpectedReply),
        }
    }

    /// Destroys a pending timer; a no-op for fired or unknown ids.
    pub fn timer_destroy(&mut self, timer: TimerId) -> HostResult<()> {
        self.call(Request::TimerDestroy { timer }).map(|_| ())
    }

    /// Schedules the calling node for teardown after the current callback
    /// returns.
    pub fn exit(&mut self) -> HostResult<()> {
        self.call(Request::Exit).map(|_| ())
    }

    /// Logs a message at the given level.
    pub fn log(&mut self, level: LogLevel, message: &str) -> HostResult<()> {
        self.call(Request::Log { level, message }).map(|_| ())
    }

    /// Logs binary data at the given level.
    pub fn log_binary(&mut self, level: LogLevel, data: &[u8]) -> HostResult<()> {
        self.call(Request::LogBinary { level, data }).map(|_| ())
    }

    /// Registers the module's global regions. Only valid during module
    /// initialization, once per module.
    pub fn register_globals(&mut self, sizes: &[usize]) -> HostResult<()> {
        self.call(Request::RegisterGlobals { sizes }).map(|_| ())
    }

    /// Installs the process-wide loop-exit callback.
    pub fn set_loopexit(&mut self, callback: TimerCallback) -> HostResult<()> {
        self.call(Request::SetLoopExit { callback }).map(|_| ())
    }

    /// Resolves a hostname to its virtual address.
    pub fn resolve_name(&mut self, name: &str) -> HostResult<Ipv4Addr> {
        match self.call(Request::ResolveName { name })? {
            Reply::Address(addr) => Ok(addr),
            _ => Err(HostError::UnexpectedReply),
        }
    }

    /// Resolves an address to its hostname, returning the bytes written.
    pub fn resolve_addr(&mut self, addr: Ipv4Addr, out: &mut [u8]) -> HostResult<usize> {
        match self.call(Request::ResolveAddr { addr, out })? {
            Reply::NameLength(len) => Ok(len),
            _ => Err(HostError::UnexpectedReply),
        }
    }

    /// Minimum configured bandwidth for `addr` in KB/s; 0 when unmapped.
    pub fn resolve_min_bandwidth(&mut self, addr: Ipv4Addr) -> HostResult<u32> {
        match self.call(Request::ResolveMinBandwidth { addr })? {
            Reply::Bandwidth(kbps) => Ok(kbps),
            _ => Err(HostError::UnexpectedReply),
        }
    }

    /// The calling node's own virtual address.
    pub fn getip(&mut self) -> HostResult<Ipv4Addr> {
        match self.call(Request::GetAddress)? {
            Reply::Address(addr) => Ok(addr),
            _ => Err(HostError::UnexpectedReply),
        }
    }

    /// The calling node's own hostname, returning the bytes written.
    pub fn gethostname(&mut self, out: &mut [u8]) -> HostResult<usize> {
        match self.call(Request::GetHostname { out })? {
            Reply::NameLength(len) => Ok(len),
            _ => Err(HostError::UnexpectedReply),
        }
    }

    /// Whether a virtual socket has data ready to read.
    pub fn socket_is_readable(&mut self, socket: SocketId) -> HostResult<bool> {
        match self.call(Request::SocketReadable { socket })? {
            Reply::Readiness(ready) => Ok(ready),
            _ => Err(HostError::UnexpectedReply),
        }
    }

    /// Whether a virtual socket can accept writes.
    pub fn socket_is_writable(&mut self, socket: SocketId) -> HostResult<bool> {
        match self.call(Request::SocketWritable { socket })? {
            Reply::Readiness(ready) => Ok(ready),
            _ => Err(HostError::UnexpectedReply),
        }
    }

    /// Read access to one of the module's live global regions.
    pub fn region(&self, id: RegionId) -> HostResult<&[u8]> {
        self.host.active_region(self.node, id)
    }

    /// Write access to one of the module's live global regions.
    pub fn region_mut(&mut self, id: RegionId) -> HostResult<&mut [u8]> {
        self.host.active_region_mut(self.node, id)
    }
}
