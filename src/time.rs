use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Milliseconds since the Unix epoch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct UnixTimeUtc(i64);

impl UnixTimeUtc {
    pub const ZERO: Self = Self(0);

    pub fn from_millis(ms: i64) -> Self {
        Self(ms)
    }

    pub fn millis(self) -> i64 {
        self.0
    }
}

/// A totally ordered unique timestamp: the upper 48 bits carry milliseconds
/// since the epoch, the low 16 bits disambiguate values issued within the
/// same millisecond. Two values issued by one `UniqueTimeSource` never
/// compare equal, so a `modified` watermark is always a strict cut.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct UnixTimeUtcUnique(u64);

impl UnixTimeUtcUnique {
    pub const ZERO: Self = Self(0);

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_raw(self) -> u64 {
        self.0
    }

    pub fn from_parts(ms: u64, seq: u16) -> Self {
        Self((ms << 16) | u64::from(seq))
    }

    pub fn millis(self) -> u64 {
        self.0 >> 16
    }

    /// The smallest value strictly greater than `self`.
    pub fn successor(self) -> Self {
        Self(self.0 + 1)
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

/// Wall-clock abstraction so unique-timestamp behavior is deterministic
/// under test. Production code uses `SystemClock`.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Strictly increasing `UnixTimeUtcUnique` generator.
///
/// Every call returns a value greater than every value issued before, even
/// when many calls land in the same millisecond and even if the clock steps
/// backwards: the candidate `now << 16` is clamped to `last + 1`.
pub struct UniqueTimeSource {
    clock: Arc<dyn Clock>,
    last: Mutex<u64>,
}

impl Default for UniqueTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl UniqueTimeSource {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            last: Mutex::new(0),
        }
    }

    pub fn now(&self) -> UnixTimeUtc {
        UnixTimeUtc::from_millis(self.clock.now_ms() as i64)
    }

    pub fn now_unique(&self) -> UnixTimeUtcUnique {
        let mut last = self.last.lock();
        let candidate = self.clock.now_ms() << 16;
        let next = candidate.max(*last + 1);
        *last = next;
        UnixTimeUtcUnique::from_raw(next)
    }

    /// Time-ordered file id: the 64-bit unique timestamp in the first eight
    /// bytes (big-endian), a random tail in the rest. Lexicographic order of
    /// ids issued by one source equals issue order, which is what lets
    /// "newest first" be a reverse scan over `file_id`.
    pub fn next_file_id(&self) -> Uuid {
        let stamp = self.now_unique().as_raw();
        let mut bytes = *Uuid::new_v4().as_bytes();
        bytes[..8].copy_from_slice(&stamp.to_be_bytes());
        Uuid::from_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::{Clock, UniqueTimeSource, UnixTimeUtcUnique};
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct FixedClock(AtomicU64);

    impl Clock for FixedClock {
        fn now_ms(&self) -> u64 {
            self.0.load(Ordering::Relaxed)
        }
    }

    #[test]
    fn now_unique_is_strictly_increasing_within_one_millisecond() {
        let source = UniqueTimeSource::with_clock(Arc::new(FixedClock(AtomicU64::new(1_000))));
        let mut prev = source.now_unique();
        for _ in 0..10_000 {
            let next = source.now_unique();
            assert!(next > prev);
            prev = next;
        }
    }

    #[test]
    fn now_unique_survives_clock_regression() {
        let clock = Arc::new(FixedClock(AtomicU64::new(5_000)));
        let source = UniqueTimeSource::with_clock(clock.clone());
        let a = source.now_unique();
        clock.0.store(1_000, Ordering::Relaxed);
        let b = source.now_unique();
        assert!(b > a);
    }

    #[test]
    fn unique_timestamp_packs_millis_and_sequence() {
        let ts = UnixTimeUtcUnique::from_parts(1_234, 7);
        assert_eq!(ts.millis(), 1_234);
        assert_eq!(ts.as_raw() & 0xFFFF, 7);
        assert!(ts.successor() > ts);
    }

    #[test]
    fn file_ids_sort_in_issue_order() {
        let source = UniqueTimeSource::with_clock(Arc::new(FixedClock(AtomicU64::new(42))));
        let mut prev = source.next_file_id();
        for _ in 0..1_000 {
            let next = source.next_file_id();
            assert!(next > prev, "file ids must sort in issue order");
            prev = next;
        }
    }

    proptest! {
        #[test]
        fn packed_order_matches_part_order(
            a_ms in 0u64..(1 << 47), a_seq in any::<u16>(),
            b_ms in 0u64..(1 << 47), b_seq in any::<u16>(),
        ) {
            let a = UnixTimeUtcUnique::from_parts(a_ms, a_seq);
            let b = UnixTimeUtcUnique::from_parts(b_ms, b_seq);
            prop_assert_eq!(a.cmp(&b), (a_ms, a_seq).cmp(&(b_ms, b_seq)));
        }
    }
}
