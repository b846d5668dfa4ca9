//! Key types: the time instant, its origin tag, and a lock-free key cell.

pub mod atomic;
pub mod query_key;
pub mod time_key;

pub use atomic::AtomicTimeKey;
pub use query_key::QueryKey;
pub use time_key::{TimeKey, MILLIS_PER_DAY};
