//! Shared helpers for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::entry::{VolatileLoader, VolatileValue};
use crate::error::{CacheError, CacheResult};

/// Minimal volatile value: a validity flag and a payload.
pub(crate) struct TestValue {
    valid: bool,
    pub payload: u32,
}

impl TestValue {
    pub fn invalid() -> Self {
        Self {
            valid: false,
            payload: 0,
        }
    }

    pub fn valid(payload: u32) -> Self {
        Self {
            valid: true,
            payload,
        }
    }
}

impl VolatileValue for TestValue {
    fn is_valid(&self) -> bool {
        self.valid
    }
}

/// Loader with configurable delay and failure mode; counts invocations.
pub(crate) struct TestLoader {
    pub calls: AtomicUsize,
    pub delay: Duration,
    pub fail: bool,
}

impl TestLoader {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            fail: false,
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }
}

impl VolatileLoader<u64, TestValue> for TestLoader {
    fn create_empty_value(&self, _key: &u64) -> TestValue {
        TestValue::invalid()
    }

    fn load(&self, key: &u64) -> CacheResult<TestValue> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if self.fail {
            return Err(CacheError::LoadFailed(format!("key {key}")));
        }
        Ok(TestValue::valid(*key as u32))
    }
}
