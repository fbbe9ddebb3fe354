//! Tunnel address allocation
//!
//! Every slot of a room maps to exactly one address inside the room's /16
//! block. The mapping is a pure function of the slot index, so two peers can
//! only share an address if they share a slot.
//!
//! Suffix `0.0` is never handed out: it is reserved for the room anchor.

use std::net::Ipv4Addr;

/// Largest slot count whose addresses still fit in a /16 block
pub const MAX_ADDRESSABLE_SLOTS: usize = 255 * 256 - 1;

/// Maps slot indices to addresses within a fixed /16 block
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AddressAllocator {
    prefix: [u8; 2],
}

impl AddressAllocator {
    pub fn new(prefix: [u8; 2]) -> Self {
        Self { prefix }
    }

    /// The block prefix (first two octets)
    pub fn prefix(&self) -> [u8; 2] {
        self.prefix
    }

    /// Address assigned to `slot`.
    ///
    /// `slot` must be below [`MAX_ADDRESSABLE_SLOTS`]; room capacity is
    /// validated against that bound when the configuration is loaded.
    pub fn allocate(&self, slot: usize) -> Ipv4Addr {
        debug_assert!(slot < MAX_ADDRESSABLE_SLOTS, "slot {} out of block", slot);
        let n = slot + 1;
        let high = (n / 255) as u8;
        let low = (n % 256) as u8;
        Ipv4Addr::new(self.prefix[0], self.prefix[1], high, low)
    }

    /// The reserved anchor address (`prefix.0.0`)
    pub fn anchor(&self) -> Ipv4Addr {
        Ipv4Addr::new(self.prefix[0], self.prefix[1], 0, 0)
    }
}

impl Default for AddressAllocator {
    fn default() -> Self {
        Self::new(crate::DEFAULT_ADDRESS_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_first_slots() {
        let alloc = AddressAllocator::default();
        assert_eq!(alloc.allocate(0), Ipv4Addr::new(10, 8, 0, 1));
        assert_eq!(alloc.allocate(1), Ipv4Addr::new(10, 8, 0, 2));
        assert_eq!(alloc.allocate(199), Ipv4Addr::new(10, 8, 0, 200));
    }

    #[test]
    fn test_octet_rollover() {
        let alloc = AddressAllocator::default();
        // n = 255 stays in the first 255-wide window
        assert_eq!(alloc.allocate(254), Ipv4Addr::new(10, 8, 1, 255));
        assert_eq!(alloc.allocate(255), Ipv4Addr::new(10, 8, 1, 0));
        assert_eq!(alloc.allocate(256), Ipv4Addr::new(10, 8, 1, 1));
    }

    #[test]
    fn test_injective_over_block() {
        let alloc = AddressAllocator::new([172, 16]);
        let mut seen = HashSet::new();
        for slot in 0..MAX_ADDRESSABLE_SLOTS {
            let addr = alloc.allocate(slot);
            assert_ne!(addr, alloc.anchor());
            assert!(seen.insert(addr), "slot {} collided at {}", slot, addr);
        }
    }

    #[test]
    fn test_prefix_is_kept() {
        let alloc = AddressAllocator::new([192, 168]);
        let addr = alloc.allocate(41);
        assert_eq!(&addr.octets()[..2], &[192, 168]);
        assert_eq!(alloc.prefix(), [192, 168]);
    }
}
