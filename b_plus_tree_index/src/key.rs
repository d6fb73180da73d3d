//! Fixed-width byte keys for the B+Tree, and the comparator that orders them.
//!
//! A key is monomorphized over one of the five required widths (4, 8, 16,
//! 32, 64 bytes per §6). Keys compare lexicographically as big-endian byte
//! strings; `from_i64`/`as_i64` encode a signed integer so its ordinary
//! numeric order matches that lexicographic order (flip the sign bit of
//! the two's-complement representation, the usual order-preserving trick).

use std::cmp::Ordering;

/// A fixed-width key of `N` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct GenericKey<const N: usize> {
    bytes: [u8; N],
}

impl<const N: usize> GenericKey<N> {
    pub fn zeroed() -> Self {
        Self { bytes: [0; N] }
    }

    pub fn from_bytes(bytes: [u8; N]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; N] {
        &self.bytes
    }

    /// Encodes `value` as a big-endian, order-preserving key occupying the
    /// low 8 bytes of the array; the remaining high-order bytes (if `N >
    /// 8`) stay zero.
    pub fn from_i64(value: i64) -> Self {
        assert!(N >= 8, "GenericKey<{N}> is too narrow to hold an i64");
        let mut bytes = [0u8; N];
        let order_preserving = (value as u64) ^ (1u64 << 63);
        bytes[N - 8..].copy_from_slice(&order_preserving.to_be_bytes());
        Self { bytes }
    }

    pub fn as_i64(&self) -> i64 {
        assert!(N >= 8, "GenericKey<{N}> is too narrow to hold an i64");
        let raw = u64::from_be_bytes(self.bytes[N - 8..].try_into().unwrap());
        (raw ^ (1u64 << 63)) as i64
    }
}

impl<const N: usize> PartialOrd for GenericKey<N> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<const N: usize> Ord for GenericKey<N> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.bytes.cmp(&other.bytes)
    }
}

/// The key comparator, kept as its own type (rather than relying solely on
/// `Ord`) to mirror the source's `Comparator(a, b)` seam, which is where a
/// real engine would plug in collation-aware or multi-column comparisons.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericComparator<const N: usize>;

impl<const N: usize> GenericComparator<N> {
    pub fn compare(&self, a: &GenericKey<N>, b: &GenericKey<N>) -> Ordering {
        a.cmp(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn i64_round_trips_through_order_preserving_encoding() {
        for v in [i64::MIN, -1, 0, 1, 42, i64::MAX] {
            let key = GenericKey::<8>::from_i64(v);
            assert_eq!(key.as_i64(), v);
        }
    }

    #[test]
    fn i64_encoding_preserves_numeric_order() {
        let values = [i64::MIN, -1000, -1, 0, 1, 1000, i64::MAX];
        let mut keys: Vec<GenericKey<8>> = values.iter().map(|&v| GenericKey::from_i64(v)).collect();
        keys.sort();
        let decoded: Vec<i64> = keys.iter().map(|k| k.as_i64()).collect();
        let mut sorted_values = values.to_vec();
        sorted_values.sort();
        assert_eq!(decoded, sorted_values);
    }

    #[test]
    fn wider_keys_zero_extend() {
        let narrow = GenericKey::<8>::from_i64(7);
        let wide = GenericKey::<16>::from_i64(7);
        assert_eq!(&wide.as_bytes()[0..8], &[0u8; 8]);
        assert_eq!(&wide.as_bytes()[8..16], narrow.as_bytes());
    }

    #[test]
    fn comparator_matches_ord() {
        let cmp = GenericComparator::<8>::default();
        let a = GenericKey::from_i64(1);
        let b = GenericKey::from_i64(2);
        assert_eq!(cmp.compare(&a, &b), Ordering::Less);
        assert_eq!(cmp.compare(&a, &a), Ordering::Equal);
    }
}
