//! Look-ahead boundary: clamps requested keys to the highest key a consumer
//! may currently see.
//!
//! The boundary starts unresolved and is read lazily from a [`BoundarySource`]
//! the first time a key beyond it is requested. Once set it only moves
//! forward, and `clear()` never resets it.

use crate::key::{AtomicTimeKey, QueryKey, TimeKey};
use crate::store::{Clearable, KeyEviction};
use parking_lot::Mutex;
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

/// Where the current boundary comes from (typically the simulation clock).
pub trait BoundarySource: Send + Sync {
    fn highest_allowed_key(&self) -> Option<TimeKey>;
}

/// Boundary source backed by a closure.
pub struct FnBoundary<F> {
    f: F,
}

impl<F> FnBoundary<F>
where
    F: Fn() -> Option<TimeKey> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> BoundarySource for FnBoundary<F>
where
    F: Fn() -> Option<TimeKey> + Send + Sync,
{
    fn highest_allowed_key(&self) -> Option<TimeKey> {
        (self.f)()
    }
}

pub trait AdjustKeyProvider: Send + Sync {
    /// `key` itself when within the boundary, otherwise the boundary.
    /// Unchanged when no boundary can be resolved.
    fn adjust_key(&self, key: TimeKey) -> TimeKey;

    /// Current boundary, resolving it if needed.
    fn highest_allowed_key(&self) -> Option<TimeKey>;

    /// Boundary before the most recent advance.
    fn previous_highest_allowed_key(&self) -> Option<TimeKey>;

    /// Drops removal bookkeeping and cascades to dependent caches.
    /// The boundary itself is kept.
    fn clear(&self);

    /// Registers a cache to be cleared when the boundary is first resolved.
    ///
    /// Returns `false` when the boundary is already resolved; the cache is
    /// then cleared immediately instead.
    fn register_dependent_cache(&self, cache: &Arc<dyn Clearable>) -> bool;

    /// The cache whose keys this provider evicts after re-entrant lookups.
    fn attach_owner(&self, _owner: Weak<dyn KeyEviction>) {}

    fn new_already_adjusted_key(&self, key: TimeKey) -> QueryKey {
        QueryKey::Adjusted(key)
    }

    /// Raw keys are clamped and tagged; navigational keys pass through.
    fn adjust_query_key(&self, key: QueryKey) -> QueryKey {
        match key {
            QueryKey::Raw(k) => self.new_already_adjusted_key(self.adjust_key(k)),
            other => other,
        }
    }

    fn adjust_optional(&self, key: Option<TimeKey>) -> Option<TimeKey> {
        key.map(|k| self.adjust_key(k))
    }
}

#[derive(Default)]
struct BoundaryState {
    dependents: Vec<Weak<dyn Clearable>>,
    pending_removal: BTreeSet<TimeKey>,
    owner: Option<Weak<dyn KeyEviction>>,
}

/// Boundary bookkeeping shared by both provider variants. Writes to the
/// atomic cells happen only under `state`.
#[derive(Default)]
struct Boundary {
    current: AtomicTimeKey,
    previous: AtomicTimeKey,
    state: Mutex<BoundaryState>,
}

fn same_target(a: &Weak<dyn Clearable>, b: &Weak<dyn Clearable>) -> bool {
    Weak::as_ptr(a) as *const () == Weak::as_ptr(b) as *const ()
}

impl Boundary {
    fn within(&self, key: TimeKey) -> bool {
        self.current.load().is_some_and(|cur| key <= cur)
    }

    fn clamp(&self, key: TimeKey) -> TimeKey {
        match self.current.load() {
            Some(cur) if key > cur => cur,
            _ => key,
        }
    }

    fn apply(&self, resolved: Option<TimeKey>) {
        let Some(new) = resolved else {
            return;
        };
        let (evicted, cascade, owner) = {
            let mut state = self.state.lock();
            let current = self.current.load();
            if current.is_some_and(|cur| new <= cur) {
                return;
            }
            if let Some(cur) = current {
                self.previous.store(cur);
            }
            self.current.store(new);
            debug!(previous = ?current, boundary = %new, "boundary advanced");

            let cascade = if current.is_none() {
                std::mem::take(&mut state.dependents)
            } else {
                Vec::new()
            };
            let evicted: Vec<TimeKey> = state
                .pending_removal
                .iter()
                .copied()
                .filter(|k| *k > new)
                .collect();
            state.pending_removal.clear();
            (evicted, cascade, state.owner.clone())
        };

        if !evicted.is_empty() {
            if let Some(owner) = owner.and_then(|w| w.upgrade()) {
                debug!(count = evicted.len(), "evicting keys served past the boundary");
                for key in evicted {
                    owner.evict(key);
                }
            }
        }
        Self::cascade(cascade);
    }

    fn cascade(dependents: Vec<Weak<dyn Clearable>>) {
        let alive: Vec<Arc<dyn Clearable>> = dependents.iter().filter_map(Weak::upgrade).collect();
        if !alive.is_empty() {
            debug!(count = alive.len(), "clearing dependent caches");
        }
        for cache in alive {
            cache.clear();
        }
    }

    fn remember(&self, key: TimeKey) {
        self.state.lock().pending_removal.insert(key);
    }

    fn register(&self, cache: &Arc<dyn Clearable>) -> bool {
        let weak = Arc::downgrade(cache);
        {
            let mut state = self.state.lock();
            if self.current.load().is_none() {
                if !state.dependents.iter().any(|d| same_target(d, &weak)) {
                    state.dependents.push(weak);
                }
                return true;
            }
        }
        cache.clear();
        false
    }

    fn clear(&self) {
        let snapshot = {
            let mut state = self.state.lock();
            state.pending_removal.clear();
            std::mem::take(&mut state.dependents)
        };
        Self::cascade(snapshot);
    }

    fn attach(&self, owner: Weak<dyn KeyEviction>) {
        self.state.lock().owner = Some(owner);
    }
}

/// Provider whose boundary source never queries historical caches.
pub struct NonRecursiveAdjustKeyProvider {
    source: Arc<dyn BoundarySource>,
    boundary: Boundary,
}

impl NonRecursiveAdjustKeyProvider {
    pub fn new(source: Arc<dyn BoundarySource>) -> Self {
        Self {
            source,
            boundary: Boundary::default(),
        }
    }

    /// A provider that never clamps.
    pub fn unbounded() -> Self {
        Self::new(Arc::new(FnBoundary::new(|| None)))
    }
}

impl AdjustKeyProvider for NonRecursiveAdjustKeyProvider {
    fn adjust_key(&self, key: TimeKey) -> TimeKey {
        if self.boundary.within(key) {
            return key;
        }
        self.boundary.apply(self.source.highest_allowed_key());
        self.boundary.clamp(key)
    }

    fn highest_allowed_key(&self) -> Option<TimeKey> {
        self.boundary.apply(self.source.highest_allowed_key());
        self.boundary.current.load()
    }

    fn previous_highest_allowed_key(&self) -> Option<TimeKey> {
        self.boundary.previous.load()
    }

    fn clear(&self) {
        self.boundary.clear();
    }

    fn register_dependent_cache(&self, cache: &Arc<dyn Clearable>) -> bool {
        self.boundary.register(cache)
    }

    fn attach_owner(&self, owner: Weak<dyn KeyEviction>) {
        self.boundary.attach(owner);
    }
}

static NEXT_PROVIDER_ID: AtomicUsize = AtomicUsize::new(1);

thread_local! {
    /// Providers currently resolving their boundary on this thread.
    static RESOLVING: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// Marks a provider as resolving for the lifetime of the guard.
struct ResolutionGuard {
    id: usize,
}

impl ResolutionGuard {
    fn enter(id: usize) -> Self {
        RESOLVING.with(|stack| stack.borrow_mut().push(id));
        Self { id }
    }
}

impl Drop for ResolutionGuard {
    fn drop(&mut self) {
        RESOLVING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(pos) = stack.iter().rposition(|id| *id == self.id) {
                stack.remove(pos);
            }
        });
    }
}

/// (any provider resolving on this thread, this provider resolving)
fn resolution_state(id: usize) -> (bool, bool) {
    RESOLVING.with(|stack| {
        let stack = stack.borrow();
        (!stack.is_empty(), stack.contains(&id))
    })
}

/// Provider whose boundary source may itself query historical caches bound
/// to this or another recursive provider.
///
/// While any boundary resolution is running on the current thread, lookups
/// beyond the boundary do not resolve again. If this provider is the one
/// resolving, or has no boundary yet, the key is served unclamped and
/// remembered; remembered keys above the next boundary are evicted from the
/// owning cache when the boundary advances. Otherwise the key is clamped to
/// the last known boundary.
pub struct RecursiveAdjustKeyProvider {
    id: usize,
    source: Arc<dyn BoundarySource>,
    boundary: Boundary,
}

impl RecursiveAdjustKeyProvider {
    pub fn new(source: Arc<dyn BoundarySource>) -> Self {
        Self {
            id: NEXT_PROVIDER_ID.fetch_add(1, Ordering::Relaxed),
            source,
            boundary: Boundary::default(),
        }
    }

    fn resolve(&self) {
        let resolved = {
            let _guard = ResolutionGuard::enter(self.id);
            self.source.highest_allowed_key()
        };
        self.boundary.apply(resolved);
    }

    pub fn pending_removal_count(&self) -> usize {
        self.boundary.state.lock().pending_removal.len()
    }
}

impl AdjustKeyProvider for RecursiveAdjustKeyProvider {
    fn adjust_key(&self, key: TimeKey) -> TimeKey {
        if self.boundary.within(key) {
            return key;
        }
        let (any, mine) = resolution_state(self.id);
        if !any {
            self.resolve();
            return self.boundary.clamp(key);
        }
        if mine || self.boundary.current.load().is_none() {
            trace!(key = %key, "re-entrant lookup, remembering key for removal");
            self.boundary.remember(key);
            return key;
        }
        self.boundary.clamp(key)
    }

    fn highest_allowed_key(&self) -> Option<TimeKey> {
        let (any, _) = resolution_state(self.id);
        if !any {
            self.resolve();
        }
        self.boundary.current.load()
    }

    fn previous_highest_allowed_key(&self) -> Option<TimeKey> {
        self.boundary.previous.load()
    }

    fn clear(&self) {
        self.boundary.clear();
    }

    fn register_dependent_cache(&self, cache: &Arc<dyn Clearable>) -> bool {
        self.boundary.register(cache)
    }

    fn attach_owner(&self, owner: Weak<dyn KeyEviction>) {
        self.boundary.attach(owner);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SimulationClock;
    use std::sync::atomic::AtomicUsize;
    use std::sync::OnceLock;

    fn k(millis: i64) -> TimeKey {
        TimeKey::from_millis(millis)
    }

    #[derive(Default)]
    struct CountingCache {
        clears: AtomicUsize,
    }

    impl Clearable for CountingCache {
        fn clear(&self) {
            self.clears.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct RecordingOwner {
        evicted: Mutex<Vec<TimeKey>>,
    }

    impl KeyEviction for RecordingOwner {
        fn evict(&self, key: TimeKey) {
            self.evicted.lock().push(key);
        }
    }

    #[test]
    fn clamps_only_beyond_boundary() {
        let clock = Arc::new(SimulationClock::starting_at(k(100)));
        let provider = NonRecursiveAdjustKeyProvider::new(clock);
        assert_eq!(provider.adjust_key(k(50)), k(50));
        assert_eq!(provider.adjust_key(k(100)), k(100));
        assert_eq!(provider.adjust_key(k(150)), k(100));
        assert_eq!(provider.highest_allowed_key(), Some(k(100)));
    }

    #[test]
    fn unresolvable_boundary_leaves_keys_unchanged() {
        let provider = NonRecursiveAdjustKeyProvider::unbounded();
        assert_eq!(provider.adjust_key(k(10_000)), k(10_000));
        assert_eq!(provider.highest_allowed_key(), None);
        assert_eq!(provider.adjust_optional(None), None);
    }

    #[test]
    fn boundary_follows_clock_forward_only() {
        let clock = Arc::new(SimulationClock::starting_at(k(100)));
        let provider = NonRecursiveAdjustKeyProvider::new(clock.clone());
        assert_eq!(provider.adjust_key(k(500)), k(100));

        clock.advance_to(k(200));
        assert_eq!(provider.adjust_key(k(500)), k(200));
        assert_eq!(provider.previous_highest_allowed_key(), Some(k(100)));

        clock.set(k(150));
        assert_eq!(provider.adjust_key(k(500)), k(200));
        assert_eq!(provider.highest_allowed_key(), Some(k(200)));
    }

    #[test]
    fn clear_keeps_boundary() {
        let clock = Arc::new(SimulationClock::starting_at(k(100)));
        let provider = NonRecursiveAdjustKeyProvider::new(clock);
        provider.adjust_key(k(500));
        provider.clear();
        assert_eq!(provider.adjust_key(k(500)), k(100));
    }

    #[test]
    fn dependents_cleared_on_first_resolution() {
        let clock = Arc::new(SimulationClock::new());
        let provider = NonRecursiveAdjustKeyProvider::new(clock.clone());
        let dependent = Arc::new(CountingCache::default());
        let as_dyn: Arc<dyn Clearable> = dependent.clone();

        assert!(provider.register_dependent_cache(&as_dyn));
        assert!(provider.register_dependent_cache(&as_dyn));
        provider.adjust_key(k(10));
        assert_eq!(dependent.clears.load(Ordering::SeqCst), 0);

        clock.advance_to(k(5));
        provider.adjust_key(k(10));
        assert_eq!(dependent.clears.load(Ordering::SeqCst), 1);

        // resolved: registration clears immediately
        assert!(!provider.register_dependent_cache(&as_dyn));
        assert_eq!(dependent.clears.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn clear_cascades_to_snapshot_of_dependents() {
        let provider = NonRecursiveAdjustKeyProvider::unbounded();
        let dependent = Arc::new(CountingCache::default());
        let as_dyn: Arc<dyn Clearable> = dependent.clone();
        provider.register_dependent_cache(&as_dyn);
        provider.clear();
        provider.clear();
        assert_eq!(dependent.clears.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reentrant_lookup_is_unclamped_then_evicted() {
        let cell: Arc<OnceLock<Weak<RecursiveAdjustKeyProvider>>> = Arc::new(OnceLock::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let source = {
            let cell = cell.clone();
            let seen = seen.clone();
            FnBoundary::new(move || {
                if let Some(provider) = cell.get().and_then(Weak::upgrade) {
                    seen.lock().push(provider.adjust_key(k(300)));
                }
                Some(k(100))
            })
        };
        let provider = Arc::new(RecursiveAdjustKeyProvider::new(Arc::new(source)));
        let owner = Arc::new(RecordingOwner::default());
        let owner_weak: Weak<RecordingOwner> = Arc::downgrade(&owner);
        provider.attach_owner(owner_weak);
        cell.set(Arc::downgrade(&provider)).unwrap();

        assert_eq!(provider.adjust_key(k(250)), k(100));
        assert_eq!(*seen.lock(), vec![k(300)]);
        assert_eq!(*owner.evicted.lock(), vec![k(300)]);
        assert_eq!(provider.pending_removal_count(), 0);
    }

    #[test]
    fn nested_provider_clamps_to_known_boundary() {
        let inner = Arc::new(RecursiveAdjustKeyProvider::new(Arc::new(
            SimulationClock::starting_at(k(50)),
        )));
        inner.adjust_key(k(1_000));

        let seen = Arc::new(Mutex::new(None));
        let source = {
            let inner = inner.clone();
            let seen = seen.clone();
            FnBoundary::new(move || {
                *seen.lock() = Some(inner.adjust_key(k(80)));
                Some(k(100))
            })
        };
        let outer = RecursiveAdjustKeyProvider::new(Arc::new(source));
        assert_eq!(outer.adjust_key(k(500)), k(100));
        assert_eq!(*seen.lock(), Some(k(50)));
        assert_eq!(inner.pending_removal_count(), 0);
    }

    #[test]
    fn query_keys_adjust_only_when_raw() {
        let provider = NonRecursiveAdjustKeyProvider::new(Arc::new(SimulationClock::starting_at(
            k(100),
        )));
        assert_eq!(
            provider.adjust_query_key(QueryKey::Raw(k(500))),
            QueryKey::Adjusted(k(100))
        );
        assert_eq!(
            provider.adjust_query_key(QueryKey::Indexed(k(500))),
            QueryKey::Indexed(k(500))
        );
    }
}
