use std::net::Ipv4Addr;
use thiserror::Error;

use crate::globals::RegionId;
use crate::module::ModuleId;
use crate::node::NodeId;
use crate::sockets::SocketId;

/// Errors reported by the substrate.
///
/// Variants fall into two classes. Configuration and context-switch errors are
/// fatal: the host must not keep running the affected node because the shared
/// live regions could be left in a corrupted state. Lookup and capacity errors
/// are recoverable and a plugin may retry or fall back. [`HostError::is_fatal`]
/// encodes the split.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    /// The module already registered its global regions.
    #[error("global regions already registered for this module")]
    GlobalsAlreadyRegistered,
    /// A registration attempt happened outside the module initialization callback.
    #[error("global regions may only be registered during module initialization")]
    RegistrationOutsideInit,
    /// A registered region had zero length.
    #[error("zero-length global region at index {index}")]
    EmptyRegion {
        /// Position of the offending region in the registration request.
        index: usize,
    },
    /// A node's snapshot does not match the module's registered region layout.
    #[error("snapshot layout mismatch: snapshot holds {snapshot} bytes, module registered {registered}")]
    LayoutMismatch {
        /// Total bytes held by the snapshot.
        snapshot: usize,
        /// Total bytes across the module's registered regions.
        registered: usize,
    },
    /// A node was activated while another node still owned the live regions.
    #[error("cannot activate node {requested:?}: node {active:?} is still active")]
    ActivationConflict {
        /// The node currently bound to the live regions.
        active: NodeId,
        /// The node whose activation was attempted.
        requested: NodeId,
    },
    /// An operation required the given node to be the active one.
    #[error("node {requested:?} is not the active node")]
    NotActive {
        /// The node the operation was issued for.
        requested: NodeId,
    },
    /// The node does not exist or has been torn down.
    #[error("unknown node {0:?}")]
    UnknownNode(NodeId),
    /// The module handle does not refer to a loaded module.
    #[error("unknown module {0:?}")]
    UnknownModule(ModuleId),
    /// The region id does not refer to a registered global region.
    #[error("unknown global region {0:?}")]
    UnknownRegion(RegionId),
    /// The descriptor does not refer to an open virtual socket of the node.
    #[error("unknown virtual socket {0:?}")]
    UnknownSocket(SocketId),
    /// No address is mapped for the hostname.
    #[error("no address mapped for hostname {0:?}")]
    UnknownHostname(String),
    /// No hostname is mapped for the address.
    #[error("no hostname mapped for address {0}")]
    UnknownAddress(Ipv4Addr),
    /// The hostname is already mapped to an address.
    #[error("hostname {0:?} is already mapped")]
    DuplicateHostname(String),
    /// The address is already mapped to a hostname.
    #[error("address {0} is already mapped")]
    DuplicateAddress(Ipv4Addr),
    /// A caller-supplied buffer is shorter than the stored value.
    ///
    /// Distinct from the not-found errors so a caller can retry with a
    /// larger buffer.
    #[error("buffer too small: need {needed} bytes, have {capacity}")]
    BufferTooSmall {
        /// Bytes required to hold the stored value.
        needed: usize,
        /// Bytes available in the supplied buffer.
        capacity: usize,
    },
    /// The gateway returned a reply variant that does not match the request.
    #[error("unexpected reply variant from dispatch")]
    UnexpectedReply,
}

impl HostError {
    /// Returns `true` when continuing to run the affected node would risk
    /// corrupting the shared live regions.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            HostError::GlobalsAlreadyRegistered
                | HostError::RegistrationOutsideInit
                | HostError::EmptyRegion { .. }
                | HostError::LayoutMismatch { .. }
                | HostError::ActivationConflict { .. }
                | HostError::NotActive { .. }
                | HostError::DuplicateHostname(_)
                | HostError::DuplicateAddress(_)
        )
    }
}

/// A type alias for `Result<T, HostError>`.
pub type HostResult<T> = Result<T, HostError>;
