//! Single-flight artifact cache.
//!
//! Each canonical name maps to a slot. The first caller to find a slot empty
//! builds while holding the slot's lock; concurrent callers for the same name
//! block on that lock and then read the result. Different names never share
//! a lock. Failed builds are handed to the callers that waited on them and
//! then forgotten, so the next request builds again.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use gsc_core::{CanonicalName, ScriptArtifact};
use parking_lot::Mutex;
use serde::Serialize;

use crate::error::LoadError;

#[derive(Debug, Default)]
enum SlotState {
    #[default]
    Empty,
    Ready(Arc<ScriptArtifact>),
    Failed(LoadError),
}

#[derive(Debug, Default)]
struct Slot {
    state: Mutex<SlotState>,
}

impl Slot {
    // A locked slot is mid-build or being read; neither counts as ready
    fn is_ready(&self) -> bool {
        self.state
            .try_lock()
            .is_some_and(|state| matches!(*state, SlotState::Ready(_)))
    }
}

/// Cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub builds: u64,
    pub failures: u64,
}

#[derive(Debug, Default)]
pub struct ArtifactCache {
    slots: DashMap<CanonicalName, Arc<Slot>>,
    hits: AtomicU64,
    misses: AtomicU64,
    builds: AtomicU64,
    failures: AtomicU64,
}

impl ArtifactCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached artifact for `name`, or run `build` to produce it.
    ///
    /// At most one `build` runs per name at a time. Errors are returned to
    /// every caller that waited on the failed build and are not cached.
    pub fn get_or_build<F>(&self, name: &CanonicalName, build: F) -> Result<Arc<ScriptArtifact>, LoadError>
    where
        F: FnOnce() -> Result<ScriptArtifact, LoadError>,
    {
        // Clone the slot out so the map shard is unlocked while we wait
        let slot = self.slots.entry(name.clone()).or_default().clone();
        let mut state = slot.state.lock();

        match &*state {
            SlotState::Ready(artifact) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(artifact.clone());
            }
            SlotState::Failed(err) => return Err(err.clone()),
            SlotState::Empty => {}
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        self.builds.fetch_add(1, Ordering::Relaxed);
        match build() {
            Ok(artifact) => {
                let artifact = Arc::new(artifact);
                *state = SlotState::Ready(artifact.clone());
                Ok(artifact)
            }
            Err(err) => {
                if matches!(err, LoadError::Failed(_)) {
                    self.failures.fetch_add(1, Ordering::Relaxed);
                }
                *state = SlotState::Failed(err.clone());
                self.slots.remove_if(name, |_, current| Arc::ptr_eq(current, &slot));
                Err(err)
            }
        }
    }

    /// A published artifact. Does not wait for builds in flight.
    pub fn get(&self, name: &CanonicalName) -> Option<Arc<ScriptArtifact>> {
        let slot = self.slots.get(name)?.clone();
        let state = slot.state.try_lock()?;
        match &*state {
            SlotState::Ready(artifact) => Some(artifact.clone()),
            _ => None,
        }
    }

    pub fn contains(&self, name: &CanonicalName) -> bool {
        self.get(name).is_some()
    }

    /// Drop a published artifact. Outstanding `Arc`s stay valid.
    ///
    /// A slot with a build in flight is left alone, so its waiters still
    /// share that build.
    pub fn evict(&self, name: &CanonicalName) -> bool {
        self.slots.remove_if(name, |_, slot| slot.is_ready()).is_some()
    }

    /// Drop every published artifact. Builds in flight are kept.
    pub fn clear(&self) {
        self.slots.retain(|_, slot| !slot.is_ready());
    }

    /// Number of published artifacts.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|entry| entry.value().is_ready()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            builds: self.builds.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{LoadFailure, Stage};
    use gsc_core::Pipeline;
    use std::sync::Barrier;
    use std::thread;

    fn artifact(name: &str) -> ScriptArtifact {
        Pipeline::default().build(name, b"main() {}").unwrap()
    }

    #[test]
    fn test_hit_after_build() {
        let cache = ArtifactCache::new();
        let name = CanonicalName::new("a");
        let first = cache.get_or_build(&name, || Ok(artifact("a"))).unwrap();
        let second = cache
            .get_or_build(&name, || panic!("built twice"))
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(cache.contains(&name));
        assert_eq!(cache.len(), 1);
        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 1,
                misses: 1,
                builds: 1,
                failures: 0
            }
        );
    }

    #[test]
    fn test_failures_are_not_cached() {
        let cache = ArtifactCache::new();
        let name = CanonicalName::new("b");
        let failure = LoadFailure {
            name: name.clone(),
            stage: Stage::Compile,
            message: "bad".into(),
        };
        let err = cache
            .get_or_build(&name, || Err(failure.clone().into()))
            .unwrap_err();
        assert_eq!(err, LoadError::Failed(failure));
        assert!(!cache.contains(&name));
        assert!(cache.is_empty());

        let missing = cache
            .get_or_build(&name, || Err(LoadError::SourceNotFound(name.clone())))
            .unwrap_err();
        assert!(missing.is_not_handled());

        cache.get_or_build(&name, || Ok(artifact("b"))).unwrap();
        assert_eq!(cache.stats().builds, 3);
        assert_eq!(cache.stats().failures, 1);
    }

    #[test]
    fn test_evict_and_clear() {
        let cache = ArtifactCache::new();
        let a = CanonicalName::new("a");
        let b = CanonicalName::new("b");
        let kept = cache.get_or_build(&a, || Ok(artifact("a"))).unwrap();
        cache.get_or_build(&b, || Ok(artifact("b"))).unwrap();

        assert!(cache.evict(&a));
        assert!(!cache.evict(&a));
        assert_eq!(kept.name(), "a");
        assert_eq!(cache.get(&a), None);
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_evict_keeps_build_in_flight() {
        let cache = ArtifactCache::new();
        let name = CanonicalName::new("a");
        let started = Barrier::new(2);
        let release = Barrier::new(2);

        thread::scope(|scope| {
            let builder = scope.spawn(|| {
                cache.get_or_build(&name, || {
                    started.wait();
                    release.wait();
                    Ok(artifact("a"))
                })
            });

            started.wait();
            assert!(!cache.evict(&name));
            cache.clear();
            let waiter = scope.spawn(|| cache.get_or_build(&name, || Ok(artifact("a"))));
            release.wait();

            let built = builder.join().unwrap().unwrap();
            let waited = waiter.join().unwrap().unwrap();
            assert!(Arc::ptr_eq(&built, &waited));
        });

        assert_eq!(cache.stats().builds, 1);
        assert!(cache.evict(&name));
    }
}
