//! Hostname, address, and bandwidth resolution.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::error::{HostError, HostResult};

/// One simulated host's naming and bandwidth record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRecord {
    /// The host's name, unique within the simulation.
    pub hostname: String,
    /// The host's virtual IPv4 address, unique within the simulation.
    pub addr: Ipv4Addr,
    /// Minimum of the host's configured upload and download bandwidth, in KB/s.
    pub min_bandwidth_kbps: u32,
}

/// Bidirectional hostname ⇄ address directory with bandwidth lookup.
///
/// The hostname/address mapping is a bijection: inserting a record whose
/// hostname or address is already mapped is a configuration error.
#[derive(Debug, Default)]
pub struct NameDirectory {
    by_name: HashMap<String, Ipv4Addr>,
    by_addr: HashMap<Ipv4Addr, AddressRecord>,
}

impl NameDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a record, enforcing the bijection invariant.
    pub fn insert(&mut self, record: AddressRecord) -> HostResult<()> {
        if self.by_name.contains_key(&record.hostname) {
            return Err(HostError::DuplicateHostname(record.hostname));
        }
        if self.by_addr.contains_key(&record.addr) {
            return Err(HostError::DuplicateAddress(record.addr));
        }
        self.by_name.insert(record.hostname.clone(), record.addr);
        self.by_addr.insert(record.addr, record);
        Ok(())
    }

    /// Exact hostname lookup.
    pub fn resolve_name(&self, name: &str) -> HostResult<Ipv4Addr> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| HostError::UnknownHostname(name.to_string()))
    }

    /// Reverse lookup, writing the hostname into `out`.
    ///
    /// Returns the number of bytes written. A buffer shorter than the stored
    /// name yields [`HostError::BufferTooSmall`], distinct from
    /// [`HostError::UnknownAddress`], and `out` is never overflowed.
    pub fn resolve_addr(&self, addr: Ipv4Addr, out: &mut [u8]) -> HostResult<usize> {
        let record = self
            .by_addr
            .get(&addr)
            .ok_or(HostError::UnknownAddress(addr))?;
        copy_name(&record.hostname, out)
    }

    /// Minimum configured bandwidth for `addr`, in KB/s.
    ///
    /// Never fails: an unmapped address reports 0, leaving "no constraint
    /// info" indistinguishable from a zero constraint by design.
    pub fn min_bandwidth(&self, addr: Ipv4Addr) -> u32 {
        self.by_addr
            .get(&addr)
            .map(|record| record.min_bandwidth_kbps)
            .unwrap_or(0)
    }

    /// The full record for `addr`, if mapped.
    pub fn record(&self, addr: Ipv4Addr) -> Option<&AddressRecord> {
        self.by_addr.get(&addr)
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.by_addr.len()
    }

    /// Returns `true` if no records are mapped.
    pub fn is_empty(&self) -> bool {
        self.by_addr.is_empty()
    }
}

/// Copies `name` into `out` under the shared buffer-capacity contract.
pub(crate) fn copy_name(name: &str, out: &mut [u8]) -> HostResult<usize> {
    let bytes = name.as_bytes();
    if out.len() < bytes.len() {
        return Err(HostError::BufferTooSmall {
            needed: bytes.len(),
            capacity: out.len(),
        });
    }
    out[..bytes.len()].copy_from_slice(bytes);
    Ok(bytes.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(hostname: &str, addr: [u8; 4], bw: u32) -> AddressRecord {
        AddressRecord {
            hostname: hostname.to_string(),
            addr: Ipv4Addr::from(addr),
            min_bandwidth_kbps: bw,
        }
    }

    #[test]
    fn name_addr_round_trip() {
        let mut directory = NameDirectory::new();
        directory
            .insert(record("relay1", [10, 0, 0, 1], 500))
            .expect("insert");

        let addr = directory.resolve_name("relay1").expect("resolve");
        let mut buf = [0u8; 32];
        let len = directory.resolve_addr(addr, &mut buf).expect("reverse");
        assert_eq!(&buf[..len], b"relay1");
    }

    #[test]
    fn unmapped_address_has_zero_bandwidth() {
        let mut directory = NameDirectory::new();
        directory
            .insert(record("relay1", [10, 0, 0, 1], 500))
            .expect("insert");

        assert_eq!(directory.min_bandwidth(Ipv4Addr::from([10, 0, 0, 1])), 500);
        // Absent addresses report 0, never an error.
        assert_eq!(directory.min_bandwidth(Ipv4Addr::from([10, 9, 9, 9])), 0);
    }

    #[test]
    fn short_buffer_is_distinct_from_not_found() {
        let mut directory = NameDirectory::new();
        directory
            .insert(record("longhostname", [10, 0, 0, 1], 100))
            .expect("insert");

        let mut tiny = [0u8; 4];
        let error = directory
            .resolve_addr(Ipv4Addr::from([10, 0, 0, 1]), &mut tiny)
            .expect_err("capacity error");
        assert_eq!(
            error,
            HostError::BufferTooSmall {
                needed: 12,
                capacity: 4
            }
        );
        // The buffer is never overflowed.
        assert_eq!(tiny, [0u8; 4]);

        let missing = directory
            .resolve_addr(Ipv4Addr::from([10, 9, 9, 9]), &mut tiny)
            .expect_err("not found");
        assert_eq!(missing, HostError::UnknownAddress(Ipv4Addr::from([10, 9, 9, 9])));
    }

    #[test]
    fn bijection_is_enforced() {
        let mut directory = NameDirectory::new();
        directory
            .insert(record("relay1", [10, 0, 0, 1], 100))
            .expect("insert");

        let dup_name = directory
            .insert(record("relay1", [10, 0, 0, 2], 100))
            .expect_err("duplicate hostname");
        assert!(dup_name.is_fatal());

        let dup_addr = directory
            .insert(record("relay2", [10, 0, 0, 1], 100))
            .expect_err("duplicate address");
        assert_eq!(dup_addr, HostError::DuplicateAddress(Ipv4Addr::from([10, 0, 0, 1])));
    }
}
