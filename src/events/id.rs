//! # Logical-clock event identifiers.
//!
//! An [`EventId`] is a fixed-format 24-character value:
//!
//! ```text
//! ┌──────────────┬────────────────────┬──────────────┐
//! │ 8 chars      │ 12 chars           │ 4 chars      │
//! │ base-36 ms   │ instance id        │ base-36 seq  │
//! └──────────────┴────────────────────┴──────────────┘
//! ```
//!
//! Every field is fixed-width and zero-padded, so plain lexicographic
//! comparison of the encoded string equals chronological/logical order.
//! The [`EventIdGenerator`] keeps one `(timestamp, counter)` pair: two ids
//! requested at the identical millisecond differ in the counter suffix, so
//! ids from one generator are strictly increasing under its own clock.
//!
//! The wall clock itself is an external collaborator behind the [`Clock`]
//! trait; tests install deterministic fakes.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

const TS_WIDTH: usize = 8;
const INSTANCE_WIDTH: usize = 12;
const COUNTER_WIDTH: usize = 4;

/// Total length of an encoded [`EventId`].
pub const ENCODED_LEN: usize = TS_WIDTH + INSTANCE_WIDTH + COUNTER_WIDTH;

/// Largest counter value representable in the 4-char base-36 suffix.
const COUNTER_MAX: u64 = 36_u64.pow(COUNTER_WIDTH as u32) - 1;

/// Supplier of wall-clock readings.
///
/// The process that owns real time is outside the core; everything here asks
/// a `Clock` instead of `SystemTime::now()` directly.
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_ms(&self) -> u64;

    /// Wall-clock reading as a [`SystemTime`].
    fn now(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(self.now_ms())
    }
}

/// The real system clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_millis() as u64)
    }

    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Globally orderable event identifier.
///
/// Equality and ordering are by encoded value; the encoding makes
/// lexicographic order equal logical order.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(Arc<str>);

impl EventId {
    /// The encoded 24-character form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Millisecond timestamp recovered from the prefix.
    pub fn millis(&self) -> u64 {
        from_base36(&self.0[..TS_WIDTH])
    }

    /// The application instance id segment.
    pub fn instance(&self) -> &str {
        &self.0[TS_WIDTH..TS_WIDTH + INSTANCE_WIDTH]
    }

    /// Same-millisecond sequence number recovered from the suffix.
    pub fn counter(&self) -> u64 {
        from_base36(&self.0[TS_WIDTH + INSTANCE_WIDTH..])
    }

    pub(crate) fn encode(timestamp: u64, counter: u64, instance: &str) -> Self {
        let mut encoded = String::with_capacity(ENCODED_LEN);
        encoded.push_str(&to_base36(timestamp, TS_WIDTH));
        encoded.push_str(instance);
        encoded.push_str(&to_base36(counter, COUNTER_WIDTH));
        EventId(encoded.into())
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventId({})", self.0)
    }
}

/// Generator of strictly increasing [`EventId`]s.
///
/// Maintains a single `(last timestamp, counter)` pair: a reading equal to
/// (or, with a misbehaving clock, earlier than) the last recorded one bumps
/// the counter instead of the timestamp, so ids never repeat or regress.
pub struct EventIdGenerator {
    clock: Arc<dyn Clock>,
    instance: Arc<str>,
    last: Mutex<(u64, u64)>,
}

impl EventIdGenerator {
    /// Creates a generator for the given instance id.
    ///
    /// The instance id is normalized to exactly 12 characters (padded with
    /// `0`, or truncated).
    pub fn new(clock: Arc<dyn Clock>, instance: impl Into<Arc<str>>) -> Self {
        Self {
            clock,
            instance: normalize_instance(&instance.into()),
            last: Mutex::new((0, 0)),
        }
    }

    /// Creates a generator with a random instance id on the system clock.
    pub fn random() -> Self {
        Self::new(Arc::new(SystemClock), random_instance_id())
    }

    /// The normalized 12-character instance id.
    pub fn instance_id(&self) -> &str {
        &self.instance
    }

    /// Reads the clock and advances the logical `(timestamp, counter)` pair.
    pub fn next_count(&self) -> (u64, u64) {
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        let now = self.clock.now_ms();
        if now <= last.0 {
            if last.1 >= COUNTER_MAX {
                // Counter space for this millisecond is exhausted; borrow
                // from the next one to stay strictly increasing.
                last.0 += 1;
                last.1 = 0;
            } else {
                last.1 += 1;
            }
        } else {
            last.0 = now;
            last.1 = 0;
        }
        *last
    }

    /// Produces the next identifier.
    pub fn next_id(&self) -> EventId {
        let (timestamp, counter) = self.next_count();
        EventId::encode(timestamp, counter, &self.instance)
    }
}

impl fmt::Debug for EventIdGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventIdGenerator")
            .field("instance", &self.instance)
            .finish()
    }
}

/// Generates a random 12-character base-36 instance id.
pub fn random_instance_id() -> Arc<str> {
    use rand::Rng;
    let mut rng = rand::rng();
    let id: String = (0..INSTANCE_WIDTH)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect();
    id.into()
}

fn normalize_instance(raw: &str) -> Arc<str> {
    let mut normalized: String = raw.chars().take(INSTANCE_WIDTH).collect();
    while normalized.chars().count() < INSTANCE_WIDTH {
        normalized.push('0');
    }
    normalized.into()
}

fn to_base36(value: u64, width: usize) -> String {
    let mut digits = vec![b'0'; width];
    let mut v = value;
    for slot in digits.iter_mut().rev() {
        *slot = ALPHABET[(v % 36) as usize];
        v /= 36;
    }
    digits.iter().map(|&b| b as char).collect()
}

fn from_base36(encoded: &str) -> u64 {
    encoded.bytes().fold(0, |acc, b| {
        let digit = match b {
            b'0'..=b'9' => (b - b'0') as u64,
            b'a'..=b'z' => (b - b'a') as u64 + 10,
            _ => 0,
        };
        acc * 36 + digit
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Deterministic clock: yields a fixed sequence of readings.
    struct FakeClock {
        readings: Vec<u64>,
        cursor: AtomicU64,
    }

    impl FakeClock {
        fn new(readings: Vec<u64>) -> Arc<Self> {
            Arc::new(Self {
                readings,
                cursor: AtomicU64::new(0),
            })
        }
    }

    impl Clock for FakeClock {
        fn now_ms(&self) -> u64 {
            let i = self.cursor.fetch_add(1, Ordering::Relaxed) as usize;
            self.readings[i.min(self.readings.len() - 1)]
        }
    }

    #[test]
    fn test_encoded_format() {
        let generator = EventIdGenerator::new(FakeClock::new(vec![1000]), "abcdefghijkl");
        let id = generator.next_id();
        assert_eq!(id.as_str().len(), ENCODED_LEN);
        assert_eq!(id.millis(), 1000);
        assert_eq!(id.instance(), "abcdefghijkl");
        assert_eq!(id.counter(), 0);
        assert!(id.as_str().chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_same_millisecond_increments_counter() {
        let generator = EventIdGenerator::new(FakeClock::new(vec![500, 500, 500]), "i");
        let ids: Vec<EventId> = (0..3).map(|_| generator.next_id()).collect();
        assert_eq!(ids[0].counter(), 0);
        assert_eq!(ids[1].counter(), 1);
        assert_eq!(ids[2].counter(), 2);
        assert!(ids[0] < ids[1] && ids[1] < ids[2]);
    }

    #[test]
    fn test_fresh_millisecond_resets_counter() {
        let generator = EventIdGenerator::new(FakeClock::new(vec![500, 500, 600]), "i");
        let a = generator.next_id();
        let b = generator.next_id();
        let c = generator.next_id();
        assert_eq!(b.counter(), 1);
        assert_eq!(c.millis(), 600);
        assert_eq!(c.counter(), 0);
        assert!(a < b && b < c);
    }

    #[test]
    fn test_backwards_clock_still_increases() {
        let generator = EventIdGenerator::new(FakeClock::new(vec![900, 400]), "i");
        let a = generator.next_id();
        let b = generator.next_id();
        assert!(a < b, "{a} should sort before {b}");
        assert_eq!(b.millis(), 900);
    }

    #[test]
    fn test_instance_id_is_normalized() {
        let clock = FakeClock::new(vec![1]);
        let short = EventIdGenerator::new(clock.clone(), "abc");
        assert_eq!(short.instance_id(), "abc000000000");
        let long = EventIdGenerator::new(clock, "abcdefghijklmnop");
        assert_eq!(long.instance_id(), "abcdefghijkl");
    }

    #[test]
    fn test_random_instance_id_shape() {
        let id = random_instance_id();
        assert_eq!(id.len(), 12);
        assert!(id.bytes().all(|b| ALPHABET.contains(&b)));
    }

    #[test]
    fn test_lexicographic_equals_numeric_order() {
        // Timestamps crossing a base-36 digit boundary keep their order
        // thanks to the fixed-width zero padding.
        let a = EventId::encode(35, 0, "instanceinst");
        let b = EventId::encode(36, 0, "instanceinst");
        assert!(a < b);
        assert!(a.as_str() < b.as_str());
    }
}
