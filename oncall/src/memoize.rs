//! Memoizing cache with per-key call deduplication.
//!
//! Every key maps to a watch channel carrying the result once it exists. The
//! first caller for a key (or the first caller after the stored result went
//! stale) installs a fresh channel and starts the computation on its own task;
//! everybody arriving while it runs waits on the same channel and receives a
//! clone of its result. Failed results are stored the same way as successful
//! ones.
//!
//! The computation does not belong to any caller, so it keeps running when
//! the caller that started it goes away, and its result is stored for the
//! next one.
//!
//! Two durations govern an entry:
//! - `freshness`: once a result is this old, the next call recomputes it.
//! - `expiry`: once a result is this old, it is removed from the map. Removal
//!   happens lazily on access, at most once per `expiry` interval.
use crate::metrics_defs::{CACHE_HIT, CACHE_MISS, CACHE_PURGED};
use parking_lot::Mutex;
use shared::counter;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::Instrument;

struct Computed<V, E> {
    result: Result<V, E>,
    computed_at: Instant,
}

type Slot<V, E> = watch::Receiver<Option<Computed<V, E>>>;

enum Lookup<V, E> {
    Joined(Slot<V, E>),
    Started(watch::Sender<Option<Computed<V, E>>>, Slot<V, E>),
}

struct Entries<V, E> {
    slots: HashMap<String, Slot<V, E>>,
    last_purge: Instant,
}

pub struct Memoizer<V, E> {
    // Used as a metric label.
    name: &'static str,
    freshness: Duration,
    expiry: Duration,
    entries: Mutex<Entries<V, E>>,
}

impl<V, E> Memoizer<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new(name: &'static str, freshness: Duration, expiry: Duration) -> Self {
        Memoizer {
            name,
            freshness,
            expiry,
            entries: Mutex::new(Entries {
                slots: HashMap::new(),
                last_purge: Instant::now(),
            }),
        }
    }

    /// Returns the stored result for `key`, running `compute` only if there is
    /// no live or in-flight entry for it.
    ///
    /// `compute` runs on a spawned task. Dropping the returned future does not
    /// cancel it.
    ///
    /// # Panics
    ///
    /// Panics if the computation this call started panicked. Callers which
    /// only joined it start their own computation instead.
    pub async fn memoize<F, Fut>(&self, key: &str, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let mut compute = Some(compute);

        loop {
            let mut slot = match self.slot(key) {
                Lookup::Joined(slot) => slot,
                Lookup::Started(tx, slot) => {
                    if let Some(compute) = compute.take() {
                        start(tx, compute());
                    }
                    slot
                }
            };

            let result = slot
                .wait_for(Option::is_some)
                .await
                .ok()
                .and_then(|computed| computed.as_ref().map(|c| c.result.clone()));

            match result {
                Some(result) => return result,
                None if compute.is_some() => continue,
                None => panic!("memoized computation for {key} panicked"),
            }
        }
    }

    fn slot(&self, key: &str) -> Lookup<V, E> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        self.purge_expired(&mut entries, now);

        if let Some(slot) = entries.slots.get(key)
            && self.is_live(slot, now)
        {
            counter!(CACHE_HIT, "cache" => self.name).increment(1);
            return Lookup::Joined(slot.clone());
        }

        counter!(CACHE_MISS, "cache" => self.name).increment(1);
        let (tx, slot) = watch::channel(None);
        entries.slots.insert(key.to_string(), slot.clone());
        Lookup::Started(tx, slot)
    }

    // In-flight entries are live so late arrivals join them.
    fn is_live(&self, slot: &Slot<V, E>, now: Instant) -> bool {
        match &*slot.borrow() {
            Some(computed) => now.duration_since(computed.computed_at) < self.freshness,
            None => is_running(slot),
        }
    }

    fn purge_expired(&self, entries: &mut Entries<V, E>, now: Instant) {
        if now.duration_since(entries.last_purge) < self.expiry {
            return;
        }
        entries.last_purge = now;

        let before = entries.slots.len();
        entries.slots.retain(|_, slot| match &*slot.borrow() {
            Some(computed) => now.duration_since(computed.computed_at) < self.expiry,
            None => is_running(slot),
        });

        let purged = before - entries.slots.len();
        if purged > 0 {
            tracing::debug!(cache = self.name, purged, "Purged expired entries");
            counter!(CACHE_PURGED, "cache" => self.name).increment(purged as u64);
        }
    }

    #[cfg(test)]
    fn stored_keys(&self) -> usize {
        self.entries.lock().slots.len()
    }
}

fn start<V, E, Fut>(tx: watch::Sender<Option<Computed<V, E>>>, computation: Fut)
where
    V: Send + Sync + 'static,
    E: Send + Sync + 'static,
    Fut: Future<Output = Result<V, E>> + Send + 'static,
{
    tokio::spawn(
        async move {
            let result = computation.await;
            // Stored even if every caller has gone away.
            tx.send_replace(Some(Computed {
                result,
                computed_at: Instant::now(),
            }));
        }
        .in_current_span(),
    );
}

// An empty slot whose sender is gone belongs to a computation that panicked.
fn is_running<V, E>(slot: &Slot<V, E>) -> bool {
    slot.has_changed().is_ok()
}
