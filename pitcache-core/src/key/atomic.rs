use super::TimeKey;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

/// Lock-free `Option<TimeKey>` cell.
///
/// Writers must be serialized externally; readers never block. Once a key is
/// stored the cell never becomes empty again.
#[derive(Debug)]
pub struct AtomicTimeKey {
    millis: AtomicI64,
    present: AtomicBool,
}

impl AtomicTimeKey {
    pub const fn empty() -> Self {
        Self {
            millis: AtomicI64::new(0),
            present: AtomicBool::new(false),
        }
    }

    pub fn load(&self) -> Option<TimeKey> {
        if self.present.load(Ordering::Acquire) {
            Some(TimeKey::from_millis(self.millis.load(Ordering::Acquire)))
        } else {
            None
        }
    }

    pub fn store(&self, key: TimeKey) {
        self.millis.store(key.millis(), Ordering::Release);
        self.present.store(true, Ordering::Release);
    }
}

impl Default for AtomicTimeKey {
    fn default() -> Self {
        Self::empty()
    }
}
