use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Width of a correlation id on the wire, in hex digits.
pub const ID_LEN: usize = 13;

/// Ids are 52-bit so they always fit in [`ID_LEN`] hex digits.
const ID_MASK: u64 = (1 << 52) - 1;

/// Identifier linking a call to its result or exception.
///
/// Rendered as exactly 13 uppercase hex digits; parsing accepts either case.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CorrelationId(u64);

impl CorrelationId {
    /// Create an id, truncating `value` to 52 bits.
    pub const fn new(value: u64) -> Self {
        Self(value & ID_MASK)
    }

    pub const fn value(self) -> u64 {
        self.0
    }

    /// Parse the fixed-width hex form. Returns `None` unless `text` is exactly
    /// [`ID_LEN`] hex digits.
    pub fn parse(text: &[u8]) -> Option<Self> {
        if text.len() != ID_LEN || !text.iter().all(u8::is_ascii_hexdigit) {
            return None;
        }
        let text = std::str::from_utf8(text).ok()?;
        u64::from_str_radix(text, 16).ok().map(Self)
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:013X}", self.0)
    }
}

impl fmt::Debug for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CorrelationId({self})")
    }
}

/// Source of correlation ids, seeded from the wall clock.
///
/// Ids are sequential from the seed, so two generators in different processes
/// are unlikely to overlap; uniqueness only matters among one side's
/// outstanding calls.
#[derive(Debug)]
pub struct IdGenerator {
    next: AtomicU64,
}

impl IdGenerator {
    pub fn new() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64 / 100)
            .unwrap_or_default();
        Self::starting_at(seed)
    }

    /// A generator whose first id is `first`.
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first & ID_MASK),
        }
    }

    pub fn next_id(&self) -> CorrelationId {
        CorrelationId::new(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_fixed_width_uppercase() {
        assert_eq!(CorrelationId::new(0).to_string(), "0000000000000");
        assert_eq!(CorrelationId::new(0xabc).to_string(), "0000000000ABC");
        assert_eq!(
            CorrelationId::new(u64::MAX).to_string(),
            "FFFFFFFFFFFFF",
            "ids are truncated to 52 bits"
        );
    }

    #[test]
    fn parse_accepts_either_case() {
        let upper = CorrelationId::parse(b"00000DEADBEEF").unwrap();
        let lower = CorrelationId::parse(b"00000deadbeef").unwrap();
        assert_eq!(upper, lower);
        assert_eq!(upper.value(), 0xDEAD_BEEF);
    }

    #[test]
    fn parse_rejects_wrong_width_and_signs() {
        assert!(CorrelationId::parse(b"ABC").is_none());
        assert!(CorrelationId::parse(b"00000000000000").is_none());
        assert!(CorrelationId::parse(b"+000000000001").is_none());
        assert!(CorrelationId::parse(b"00000000000G1").is_none());
    }

    #[test]
    fn generator_is_sequential_and_wraps_within_mask() {
        let ids = IdGenerator::starting_at(ID_MASK);
        assert_eq!(ids.next_id().value(), ID_MASK);
        assert_eq!(ids.next_id().value(), 0);
        assert_eq!(ids.next_id().value(), 1);
    }
}
