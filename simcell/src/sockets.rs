//! Per-node virtual sockets.
//!
//! A virtual socket is a core-managed descriptor standing in for a real OS
//! socket. Plugins only ever query its readiness; the flags themselves are
//! set by the transport simulation, either directly or through scheduled
//! `SocketStatus` events. Readiness queries never block, never allocate,
//! and never mutate state.

use std::collections::BTreeMap;

use crate::error::{HostError, HostResult};

/// Identifies a virtual socket within its owning node.
///
/// Descriptor ids are monotonic per node and never reused, so an id stays
/// unique among the node's open sockets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SocketId(pub u64);

/// State of one open virtual socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualSocket {
    /// Port the socket is bound to on its node's virtual address.
    pub port: u16,
    /// Set when the transport simulation has data ready to read.
    pub readable: bool,
    /// Set when the transport simulation can accept writes.
    pub writable: bool,
}

/// The open virtual sockets of one node.
#[derive(Debug, Default)]
pub struct SocketTable {
    next_id: u64,
    open: BTreeMap<SocketId, VirtualSocket>,
}

impl SocketTable {
    /// Opens a socket bound to `port` and returns its descriptor.
    pub fn open(&mut self, port: u16) -> SocketId {
        self.next_id += 1;
        let id = SocketId(self.next_id);
        self.open.insert(
            id,
            VirtualSocket {
                port,
                readable: false,
                writable: false,
            },
        );
        id
    }

    /// Closes a socket. Closing an unknown descriptor is a no-op.
    pub fn close(&mut self, id: SocketId) -> bool {
        self.open.remove(&id).is_some()
    }

    /// Updates readiness flags, as decided by the transport simulation.
    pub fn set_ready(&mut self, id: SocketId, readable: bool, writable: bool) -> HostResult<()> {
        let socket = self.open.get_mut(&id).ok_or(HostError::UnknownSocket(id))?;
        socket.readable = readable;
        socket.writable = writable;
        Ok(())
    }

    /// Whether the socket has data ready to read.
    pub fn is_readable(&self, id: SocketId) -> HostResult<bool> {
        self.open
            .get(&id)
            .map(|socket| socket.readable)
            .ok_or(HostError::UnknownSocket(id))
    }

    /// Whether the socket can accept writes.
    pub fn is_writable(&self, id: SocketId) -> HostResult<bool> {
        self.open
            .get(&id)
            .map(|socket| socket.writable)
            .ok_or(HostError::UnknownSocket(id))
    }

    /// The socket's state, if open.
    pub fn get(&self, id: SocketId) -> Option<&VirtualSocket> {
        self.open.get(&id)
    }

    /// Number of open sockets.
    pub fn open_count(&self) -> usize {
        self.open.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readiness_reflects_transport_state() {
        let mut table = SocketTable::default();
        let id = table.open(80);

        assert_eq!(table.is_readable(id), Ok(false));
        assert_eq!(table.is_writable(id), Ok(false));

        table.set_ready(id, true, false).expect("set ready");
        assert_eq!(table.is_readable(id), Ok(true));
        assert_eq!(table.is_writable(id), Ok(false));
    }

    #[test]
    fn unknown_descriptor_is_an_error() {
        let table = SocketTable::default();
        let missing = SocketId(7);
        assert_eq!(table.is_readable(missing), Err(HostError::UnknownSocket(missing)));
        assert_eq!(table.is_writable(missing), Err(HostError::UnknownSocket(missing)));
        assert!(!HostError::UnknownSocket(missing).is_fatal());
    }

    #[test]
    fn closed_descriptor_stops_answering() {
        let mut table = SocketTable::default();
        let id = table.open(443);
        assert!(table.close(id));
        assert!(!table.close(id));
        assert_eq!(table.is_readable(id), Err(HostError::UnknownSocket(id)));
    }
}
