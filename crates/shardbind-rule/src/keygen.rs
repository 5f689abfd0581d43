//! Key generators for generated key columns

use crate::config::{KeyGenerateStrategy, KeyGeneratorConfig};
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use shardbind_common::{Error, Result, Value};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Produces values for a generated key column
pub trait KeyGenerator: Send + Sync {
    fn next_key(&self) -> Result<Value>;

    fn strategy(&self) -> KeyGenerateStrategy;
}

/// Build the generator a key generator configuration asks for
pub fn create_key_generator(config: &KeyGeneratorConfig) -> Result<Arc<dyn KeyGenerator>> {
    Ok(match config.strategy {
        KeyGenerateStrategy::Snowflake => Arc::new(SnowflakeKeyGenerator::new(config.worker_id)?),
        KeyGenerateStrategy::Uuid => Arc::new(UuidKeyGenerator),
        KeyGenerateStrategy::Sequence => Arc::new(SequenceKeyGenerator::new(config.start, 1)),
    })
}

const WORKER_ID_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;
const SEQUENCE_MASK: i64 = (1 << SEQUENCE_BITS) - 1;
const MAX_WORKER_ID: u16 = (1 << WORKER_ID_BITS) - 1;

/// 2016-11-01T00:00:00Z, in milliseconds
const SNOWFLAKE_EPOCH_MILLIS: i64 = 1_477_958_400_000;

/// 64-bit time-ordered keys: 41 bits of milliseconds since the epoch,
/// 10 bits of worker id, 12 bits of per-millisecond sequence.
pub struct SnowflakeKeyGenerator {
    worker_id: i64,
    /// (last timestamp handed out, sequence within it)
    state: Mutex<(i64, i64)>,
    clock: fn() -> i64,
}

fn system_millis() -> i64 {
    Utc::now().timestamp_millis()
}

impl SnowflakeKeyGenerator {
    pub fn new(worker_id: u16) -> Result<Self> {
        Self::with_clock(worker_id, system_millis)
    }

    pub fn with_clock(worker_id: u16, clock: fn() -> i64) -> Result<Self> {
        if worker_id > MAX_WORKER_ID {
            return Err(Error::Config(format!(
                "snowflake worker id must be at most {}, got {}",
                MAX_WORKER_ID, worker_id
            )));
        }
        Ok(SnowflakeKeyGenerator {
            worker_id: worker_id as i64,
            state: Mutex::new((0, 0)),
            clock,
        })
    }

    /// Milliseconds since the snowflake epoch encoded in a key
    pub fn timestamp_of(key: i64) -> i64 {
        (key >> (WORKER_ID_BITS + SEQUENCE_BITS)) + SNOWFLAKE_EPOCH_MILLIS
    }

    fn next_id(&self) -> Result<i64> {
        let now = (self.clock)();
        if now < SNOWFLAKE_EPOCH_MILLIS {
            return Err(Error::KeyGeneration(format!(
                "clock is before the snowflake epoch: {}",
                Utc.timestamp_millis_opt(now)
                    .single()
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| now.to_string())
            )));
        }

        let mut state = self.state.lock();
        let (last, sequence) = *state;
        // A clock moving backwards keeps issuing from the last timestamp
        let (timestamp, sequence) = if now > last {
            (now, 0)
        } else if sequence < SEQUENCE_MASK {
            (last, sequence + 1)
        } else {
            (last + 1, 0)
        };
        *state = (timestamp, sequence);

        Ok(((timestamp - SNOWFLAKE_EPOCH_MILLIS) << (WORKER_ID_BITS + SEQUENCE_BITS))
            | (self.worker_id << SEQUENCE_BITS)
            | sequence)
    }
}

impl KeyGenerator for SnowflakeKeyGenerator {
    fn next_key(&self) -> Result<Value> {
        self.next_id().map(Value::BigInt)
    }

    fn strategy(&self) -> KeyGenerateStrategy {
        KeyGenerateStrategy::Snowflake
    }
}

/// Random version 4 UUID keys
pub struct UuidKeyGenerator;

impl KeyGenerator for UuidKeyGenerator {
    fn next_key(&self) -> Result<Value> {
        Ok(Value::Uuid(Uuid::new_v4()))
    }

    fn strategy(&self) -> KeyGenerateStrategy {
        KeyGenerateStrategy::Uuid
    }
}

/// Process-local counter, handy for tests and single-node setups
pub struct SequenceKeyGenerator {
    /// Current value (atomically updated)
    current_value: AtomicI64,
    /// Increment per call
    increment: i64,
}

impl SequenceKeyGenerator {
    pub fn new(start: i64, increment: i64) -> Self {
        SequenceKeyGenerator {
            // Start at start - increment so the first key is start
            current_value: AtomicI64::new(start - increment),
            increment,
        }
    }

    /// Get the current value without incrementing
    pub fn currval(&self) -> i64 {
        self.current_value.load(Ordering::SeqCst)
    }
}

impl KeyGenerator for SequenceKeyGenerator {
    fn next_key(&self) -> Result<Value> {
        let prev = self.current_value.fetch_add(self.increment, Ordering::SeqCst);
        prev.checked_add(self.increment)
            .map(Value::BigInt)
            .ok_or_else(|| Error::KeyGeneration("sequence overflow".to_string()))
    }

    fn strategy(&self) -> KeyGenerateStrategy {
        KeyGenerateStrategy::Sequence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_clock() -> i64 {
        SNOWFLAKE_EPOCH_MILLIS + 1_000
    }

    #[test]
    fn test_sequence_starts_at_start() {
        let generator = SequenceKeyGenerator::new(100, 1);
        assert_eq!(generator.next_key().unwrap(), Value::BigInt(100));
        assert_eq!(generator.next_key().unwrap(), Value::BigInt(101));
        assert_eq!(generator.currval(), 101);
    }

    #[test]
    fn test_snowflake_same_millisecond_increments_sequence() {
        let generator = SnowflakeKeyGenerator::with_clock(3, fixed_clock).unwrap();
        let first = generator.next_id().unwrap();
        let second = generator.next_id().unwrap();
        assert_eq!(second, first + 1);
        assert_eq!((first >> SEQUENCE_BITS) & MAX_WORKER_ID as i64, 3);
        assert_eq!(SnowflakeKeyGenerator::timestamp_of(first), fixed_clock());
    }

    #[test]
    fn test_snowflake_sequence_overflow_borrows_next_millisecond() {
        let generator = SnowflakeKeyGenerator::with_clock(0, fixed_clock).unwrap();
        let mut last = 0;
        for _ in 0..=SEQUENCE_MASK + 1 {
            let id = generator.next_id().unwrap();
            assert!(id > last);
            last = id;
        }
        assert_eq!(SnowflakeKeyGenerator::timestamp_of(last), fixed_clock() + 1);
    }

    #[test]
    fn test_snowflake_rejects_large_worker_id() {
        assert!(matches!(
            SnowflakeKeyGenerator::new(1024),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_uuid_keys_differ() {
        let generator = UuidKeyGenerator;
        assert_ne!(generator.next_key().unwrap(), generator.next_key().unwrap());
    }
}
