use super::TimeKey;
use std::fmt;

/// A key tagged with where it came from.
///
/// Only `Raw` keys (straight from a consumer) are subject to look-ahead
/// interception and clamping. Keys produced by boundary adjustment or by
/// navigation over stored keys carry their tag so downstream layers skip the
/// redundant re-clamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKey {
    Raw(TimeKey),
    Adjusted(TimeKey),
    Indexed(TimeKey),
}

impl QueryKey {
    pub fn key(self) -> TimeKey {
        match self {
            QueryKey::Raw(k) | QueryKey::Adjusted(k) | QueryKey::Indexed(k) => k,
        }
    }

    pub fn is_raw(self) -> bool {
        matches!(self, QueryKey::Raw(_))
    }

    /// Adjusted or indexed: produced internally, already within the boundary.
    pub fn is_navigational(self) -> bool {
        !self.is_raw()
    }
}

impl From<TimeKey> for QueryKey {
    fn from(key: TimeKey) -> Self {
        QueryKey::Raw(key)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryKey::Raw(k) => write!(f, "{k}"),
            QueryKey::Adjusted(k) => write!(f, "{k} (adjusted)"),
            QueryKey::Indexed(k) => write!(f, "{k} (indexed)"),
        }
    }
}
