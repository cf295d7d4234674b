//! Human-legible codes for inventory lots and orders.
//!
//! A code is built from four parts:
//!
//! 1. the first four alphanumeric characters of a name, padded with the filler
//! 2. the first and last alphanumeric character of a kind (category), upper-cased
//! 3. the last two digits of the year
//! 4. the base-36 form of `month ++ day ++ unix millis` read as a number
//!
//! One generator never issues the same millisecond twice: when the clock has
//! not moved past the last issued instant, the stamp is advanced by one
//! millisecond. Generators in other processes can still produce an identical
//! code. Uniqueness is enforced by the store, and callers retry with a fresh
//! code on a collision.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Datelike, TimeDelta, Utc};

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Generates codes from identity fragments and the current time.
///
/// Clones share the record of the last issued instant.
#[derive(Clone)]
pub struct CodeGenerator {
    filler: char,
    clock: Clock,
    last_issued: Arc<AtomicI64>,
}

impl fmt::Debug for CodeGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodeGenerator")
            .field("filler", &self.filler)
            .finish_non_exhaustive()
    }
}

impl Default for CodeGenerator {
    fn default() -> Self {
        Self::new('X')
    }
}

impl CodeGenerator {
    /// Creates a generator reading the system clock.
    pub fn new(filler: char) -> Self {
        Self {
            filler,
            clock: Arc::new(Utc::now),
            last_issued: Arc::new(AtomicI64::new(i64::MIN)),
        }
    }

    /// Replaces the time source.
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    pub fn generate(&self, name: &str, kind: &str) -> String {
        compose_code(name, kind, self.next_instant(), self.filler)
    }

    /// The clock reading, moved forward past the last issued millisecond.
    fn next_instant(&self) -> DateTime<Utc> {
        let now = (self.clock)();
        let wanted = now.timestamp_millis();
        let mut last = self.last_issued.load(Ordering::Acquire);
        loop {
            let next = wanted.max(last.saturating_add(1));
            match self.last_issued.compare_exchange_weak(
                last,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    return now
                        .checked_add_signed(TimeDelta::milliseconds(next - wanted))
                        .unwrap_or(now);
                }
                Err(seen) => last = seen,
            }
        }
    }
}

/// Builds a code for the given fragments at instant `at`.
pub fn compose_code(name: &str, kind: &str, at: DateTime<Utc>, filler: char) -> String {
    let mut code = String::with_capacity(16);

    let head: Vec<char> = name.chars().filter(|c| c.is_alphanumeric()).take(4).collect();
    code.extend(head.iter());
    code.extend(std::iter::repeat_n(filler, 4 - head.len()));

    let mut kind_chars = kind.chars().filter(|c| c.is_alphanumeric());
    match kind_chars.next() {
        Some(first) => {
            let last = kind_chars.last().unwrap_or(first);
            code.extend(first.to_uppercase());
            code.extend(last.to_uppercase());
        }
        None => {
            code.push(filler);
            code.push(filler);
        }
    }

    code.push_str(&format!("{:02}", at.year().rem_euclid(100)));

    let stamp = format!(
        "{}{}{}",
        at.month(),
        at.day(),
        at.timestamp_millis().unsigned_abs()
    );
    // month and day add at most four digits to a u64, well inside u128
    let value = stamp.parse::<u128>().unwrap_or_default();
    code.push_str(&to_base36(value));

    code
}

/// Upper-case base-36 rendering of `value`.
pub fn to_base36(mut value: u128) -> String {
    const DIGITS: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

    if value == 0 {
        return "0".to_string();
    }

    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}
