//! Advisory cache - avoids repeated assistant calls while a patient's state is unchanged
//!
//! Keyed on (patient, classification, rounded snapshot) with a short TTL. One
//! request per key fetches at a time; concurrent requests for the same key
//! wait for that fetch, but never past their own deadline, and receive its
//! result. Failures are handed to those waiters and never cached.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::ai::types::AssistantAdvisory;
use crate::error::AssistantError;
use crate::model::{Metric, Severity};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub patient_id: String,
    pub classification: Severity,
    pub snapshot: Vec<(Metric, i64)>,
}

struct CachedAdvisory {
    advisory: AssistantAdvisory,
    stored_at: Instant,
}

#[derive(Default)]
struct SlotState {
    cached: Option<CachedAdvisory>,
    in_flight: bool,
    /// Bumped each time a fetch completes
    generation: u64,
    /// Outcome of the last completed fetch, for requests that waited on it
    last_failure: Option<AssistantError>,
}

#[derive(Default)]
struct Slot {
    state: Mutex<SlotState>,
    done: Condvar,
}

pub struct AdvisoryCache {
    ttl: Duration,
    slots: Mutex<HashMap<CacheKey, Arc<Slot>>>,
}

impl AdvisoryCache {
    /// A zero TTL disables caching
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    /// Return a fresh cached advisory, or run `fetch` unless another request already is
    ///
    /// A request that finds a fetch in flight waits at most `wait` for its
    /// outcome. The boolean is `true` when the advisory came from the cache or
    /// from another request's fetch.
    pub fn get_or_fetch<F>(
        &self,
        key: CacheKey,
        wait: Duration,
        fetch: F,
    ) -> Result<(AssistantAdvisory, bool), AssistantError>
    where
        F: FnOnce() -> Result<AssistantAdvisory, AssistantError>,
    {
        if !self.is_enabled() {
            return fetch().map(|advisory| (advisory, false));
        }

        let slot = self.slot(&key);
        let deadline = Instant::now() + wait;
        let mut state = lock(&slot.state);

        loop {
            if let Some(cached) = state.cached.as_ref() {
                if cached.stored_at.elapsed() < self.ttl {
                    debug!(patient_id = %key.patient_id, classification = %key.classification, "Advisory cache hit");
                    return Ok((cached.advisory.clone(), true));
                }
            }
            if !state.in_flight {
                break;
            }

            let generation = state.generation;
            while state.in_flight && state.generation == generation {
                let now = Instant::now();
                if now >= deadline {
                    debug!(patient_id = %key.patient_id, "Gave up waiting for in-flight assistant call");
                    return Err(AssistantError::Unavailable(format!(
                        "assistant call still in flight after {}ms",
                        wait.as_millis()
                    )));
                }
                state = slot
                    .done
                    .wait_timeout(state, deadline - now)
                    .map(|(guard, _)| guard)
                    .unwrap_or_else(|e| e.into_inner().0);
            }

            if state.generation != generation {
                if let Some(err) = state.last_failure.clone() {
                    return Err(err);
                }
            }
        }

        state.in_flight = true;
        drop(state);

        let result = fetch();

        let mut state = lock(&slot.state);
        state.in_flight = false;
        state.generation = state.generation.wrapping_add(1);
        match &result {
            Ok(advisory) => {
                state.cached = Some(CachedAdvisory {
                    advisory: advisory.clone(),
                    stored_at: Instant::now(),
                });
                state.last_failure = None;
            }
            Err(err) => state.last_failure = Some(err.clone()),
        }
        drop(state);
        slot.done.notify_all();

        result.map(|advisory| (advisory, false))
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.purge_expired();
        let ttl = self.ttl;
        lock(&self.slots)
            .values()
            .filter(|slot| match slot.state.try_lock() {
                Ok(state) => state.cached.as_ref().map_or(false, |c| c.stored_at.elapsed() < ttl),
                Err(_) => true,
            })
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        lock(&self.slots).clear();
    }

    fn slot(&self, key: &CacheKey) -> Arc<Slot> {
        self.purge_expired();
        Arc::clone(lock(&self.slots).entry(key.clone()).or_default())
    }

    /// Drop expired slots nobody is currently using
    fn purge_expired(&self) {
        let ttl = self.ttl;
        lock(&self.slots).retain(|_, slot| {
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            match slot.state.try_lock() {
                Ok(state) => state.in_flight || state.cached.as_ref().map_or(false, |c| c.stored_at.elapsed() < ttl),
                Err(_) => true,
            }
        });
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread::sleep;

    const WAIT: Duration = Duration::from_secs(5);

    fn key(patient: &str, severity: Severity, hr: i64) -> CacheKey {
        CacheKey {
            patient_id: patient.to_string(),
            classification: severity,
            snapshot: vec![(Metric::HeartRate, hr)],
        }
    }

    fn advisory(text: &str) -> AssistantAdvisory {
        AssistantAdvisory {
            classification: Severity::Watch,
            guidance: text.to_string(),
            caveats: Vec::new(),
            generated_at: Utc::now(),
        }
    }

    #[test]
    fn test_second_lookup_within_ttl_is_cached() {
        let cache = AdvisoryCache::new(Duration::from_secs(60));
        let calls = AtomicUsize::new(0);
        let fetch = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(advisory("rest"))
        };

        let (_, cached) = cache.get_or_fetch(key("p1", Severity::Watch, 110), WAIT, fetch).unwrap();
        assert!(!cached);
        let (a, cached) = cache.get_or_fetch(key("p1", Severity::Watch, 110), WAIT, fetch).unwrap();
        assert!(cached);
        assert_eq!(a.guidance, "rest");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_distinct_keys_are_independent() {
        let cache = AdvisoryCache::new(Duration::from_secs(60));
        cache.get_or_fetch(key("p1", Severity::Watch, 110), WAIT, || Ok(advisory("a"))).unwrap();
        let (a, cached) = cache
            .get_or_fetch(key("p2", Severity::Watch, 110), WAIT, || Ok(advisory("b")))
            .unwrap();
        assert!(!cached);
        assert_eq!(a.guidance, "b");

        let (_, cached) = cache
            .get_or_fetch(key("p1", Severity::Urgent, 110), WAIT, || Ok(advisory("c")))
            .unwrap();
        assert!(!cached);
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_failures_are_not_cached() {
        let cache = AdvisoryCache::new(Duration::from_secs(60));
        let err = cache
            .get_or_fetch(key("p1", Severity::Watch, 110), WAIT, || {
                Err(AssistantError::Unavailable("down".to_string()))
            })
            .unwrap_err();
        assert_eq!(err, AssistantError::Unavailable("down".to_string()));

        let (_, cached) = cache
            .get_or_fetch(key("p1", Severity::Watch, 110), WAIT, || Ok(advisory("ok")))
            .unwrap();
        assert!(!cached);
    }

    #[test]
    fn test_expired_entries_refetch() {
        let cache = AdvisoryCache::new(Duration::from_millis(50));
        cache.get_or_fetch(key("p1", Severity::Watch, 110), WAIT, || Ok(advisory("old"))).unwrap();
        sleep(Duration::from_millis(80));
        assert!(cache.is_empty());

        let (a, cached) = cache
            .get_or_fetch(key("p1", Severity::Watch, 110), WAIT, || Ok(advisory("new")))
            .unwrap();
        assert!(!cached);
        assert_eq!(a.guidance, "new");
    }

    #[test]
    fn test_zero_ttl_disables_cache() {
        let cache = AdvisoryCache::new(Duration::ZERO);
        assert!(!cache.is_enabled());
        for _ in 0..2 {
            let (_, cached) = cache
                .get_or_fetch(key("p1", Severity::Watch, 110), WAIT, || Ok(advisory("x")))
                .unwrap();
            assert!(!cached);
        }
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_identical_keys_fetch_once() {
        let cache = Arc::new(AdvisoryCache::new(Duration::from_secs(60)));
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                std::thread::spawn(move || {
                    cache
                        .get_or_fetch(key("p1", Severity::Urgent, 130), WAIT, || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            sleep(Duration::from_millis(30));
                            Ok(advisory("call now"))
                        })
                        .unwrap()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap().0.guidance, "call now");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_waiters_share_in_flight_failure_without_caching_it() {
        let cache = Arc::new(AdvisoryCache::new(Duration::from_secs(60)));
        let calls = Arc::new(AtomicUsize::new(0));

        let first = {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            std::thread::spawn(move || {
                cache.get_or_fetch(key("p1", Severity::Urgent, 130), WAIT, || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    sleep(Duration::from_millis(150));
                    Err(AssistantError::Unavailable("down".to_string()))
                })
            })
        };
        sleep(Duration::from_millis(30));

        let waiter = cache.get_or_fetch(key("p1", Severity::Urgent, 130), WAIT, || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(advisory("should not run"))
        });
        assert_eq!(waiter.unwrap_err(), AssistantError::Unavailable("down".to_string()));
        assert!(first.join().unwrap().is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let (a, cached) = cache
            .get_or_fetch(key("p1", Severity::Urgent, 130), WAIT, || Ok(advisory("back up")))
            .unwrap();
        assert!(!cached);
        assert_eq!(a.guidance, "back up");
    }

    #[test]
    fn test_waiter_gives_up_at_its_deadline() {
        let cache = Arc::new(AdvisoryCache::new(Duration::from_secs(60)));
        let slow = {
            let cache = Arc::clone(&cache);
            std::thread::spawn(move || {
                cache.get_or_fetch(key("p1", Severity::Urgent, 130), WAIT, || {
                    sleep(Duration::from_millis(800));
                    Ok(advisory("late"))
                })
            })
        };
        sleep(Duration::from_millis(30));

        let start = Instant::now();
        let err = cache
            .get_or_fetch(key("p1", Severity::Urgent, 130), Duration::from_millis(100), || {
                Ok(advisory("unused"))
            })
            .unwrap_err();
        assert!(matches!(err, AssistantError::Unavailable(_)));
        assert!(start.elapsed() < Duration::from_millis(500));

        assert_eq!(slow.join().unwrap().unwrap().0.guidance, "late");
    }

    #[test]
    fn test_other_keys_do_not_wait_for_a_slow_fetch() {
        let cache = Arc::new(AdvisoryCache::new(Duration::from_secs(60)));
        let slow = {
            let cache = Arc::clone(&cache);
            std::thread::spawn(move || {
                cache.get_or_fetch(key("p1", Severity::Urgent, 130), WAIT, || {
                    sleep(Duration::from_millis(500));
                    Ok(advisory("slow"))
                })
            })
        };
        sleep(Duration::from_millis(30));

        let start = Instant::now();
        cache
            .get_or_fetch(key("p2", Severity::Urgent, 130), WAIT, || Ok(advisory("fast")))
            .unwrap();
        assert!(start.elapsed() < Duration::from_millis(300));
        slow.join().unwrap().unwrap();
    }
}
