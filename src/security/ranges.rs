//! Datacenter address ranges.
//!
//! Restricted mode only admits callers whose address falls inside one of the
//! networks announced for Roblox game servers (AS22697). The table is compiled
//! in and never reloaded.

use std::net::IpAddr;

/// Inclusive IPv4 interval, stored as host-order integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressRange {
    low: u32,
    high: u32,
}

impl AddressRange {
    /// Build a range from explicit bounds. Returns `None` when `low > high`.
    pub fn new(low: u32, high: u32) -> Option<Self> {
        (low <= high).then_some(Self { low, high })
    }

    /// Build the range covered by a CIDR block.
    pub const fn cidr(octets: [u8; 4], prefix: u8) -> Self {
        assert!(prefix <= 32, "IPv4 prefix length must be 0-32");
        let mask = if prefix == 0 { 0 } else { u32::MAX << (32 - prefix) };
        let low = u32::from_be_bytes(octets) & mask;
        Self { low, high: low | !mask }
    }

    pub fn low(&self) -> u32 {
        self.low
    }

    pub fn high(&self) -> u32 {
        self.high
    }

    pub fn contains(&self, address: u32) -> bool {
        self.low <= address && address <= self.high
    }
}

/// Networks announced by AS22697.
pub static ROBLOX_RANGES: &[AddressRange] = &[
    AddressRange::cidr([23, 173, 192, 0], 24),
    AddressRange::cidr([103, 140, 28, 0], 23),
    AddressRange::cidr([103, 142, 220, 0], 23),
    AddressRange::cidr([128, 116, 0, 0], 17),
    AddressRange::cidr([141, 193, 3, 0], 24),
    AddressRange::cidr([204, 9, 184, 0], 24),
    AddressRange::cidr([204, 13, 168, 0], 22),
    AddressRange::cidr([204, 13, 172, 0], 23),
    AddressRange::cidr([205, 201, 62, 0], 24),
    AddressRange::cidr([209, 206, 40, 0], 21),
];

/// Immutable set of address ranges answering membership queries.
///
/// Overlapping or duplicate entries are fine: lookup only asks whether any
/// entry covers the address.
#[derive(Debug, Clone)]
pub struct RangeTable {
    ranges: Vec<AddressRange>,
}

impl RangeTable {
    pub fn new(ranges: Vec<AddressRange>) -> Self {
        Self { ranges }
    }

    /// The compiled-in datacenter table.
    pub fn builtin() -> Self {
        Self::new(ROBLOX_RANGES.to_vec())
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Whether `address` is an IPv4 address (or IPv4-mapped IPv6 address)
    /// inside one of the ranges. Anything unparsable is outside.
    pub fn contains(&self, address: &str) -> bool {
        parse_ipv4(address).is_some_and(|ip| self.contains_u32(ip))
    }

    pub fn contains_ip(&self, address: IpAddr) -> bool {
        ipv4_bits(address).is_some_and(|ip| self.contains_u32(ip))
    }

    fn contains_u32(&self, address: u32) -> bool {
        self.ranges.iter().any(|range| range.contains(address))
    }
}

impl Default for RangeTable {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Parse a textual address into its IPv4 value, unwrapping `::ffff:a.b.c.d`.
pub fn parse_ipv4(address: &str) -> Option<u32> {
    address.parse::<IpAddr>().ok().and_then(ipv4_bits)
}

fn ipv4_bits(address: IpAddr) -> Option<u32> {
    match address {
        IpAddr::V4(v4) => Some(u32::from(v4)),
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map(u32::from),
    }
}
