use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

use crate::types::Classification;

enum Slot {
    Ready(Classification),
    InFlight(watch::Receiver<Option<Classification>>),
}

/// Classification results keyed by normalized description.
///
/// A lookup that misses claims the key before the caller talks to the
/// provider, so concurrent lookups for the same description wait on the
/// first call instead of issuing their own.
#[derive(Clone, Default)]
pub struct ClassificationCache {
    slots: Arc<Mutex<HashMap<String, Slot>>>,
}

pub enum Lookup {
    Hit(Classification),
    /// Another task is classifying this key.
    Wait(Waiter),
    /// The caller owns the key and must resolve it.
    Claimed(InFlight),
}

pub struct Waiter {
    rx: watch::Receiver<Option<Classification>>,
}

impl Waiter {
    /// Resolves to `Unclassified` if the owning task gives up without an answer.
    pub async fn wait(mut self) -> Classification {
        match self.rx.wait_for(Option::is_some).await {
            Ok(value) => (*value).clone().unwrap_or(Classification::Unclassified),
            Err(_) => Classification::Unclassified,
        }
    }
}

/// Ownership of an in-flight key. Dropping it without resolving releases the
/// key so a later lookup can try again.
pub struct InFlight {
    key: String,
    tx: Option<watch::Sender<Option<Classification>>>,
    slots: Arc<Mutex<HashMap<String, Slot>>>,
}

impl InFlight {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Store a definitive answer and wake waiters.
    pub fn complete(mut self, classification: Classification) {
        lock(&self.slots).insert(self.key.clone(), Slot::Ready(classification.clone()));
        if let Some(tx) = self.tx.take() {
            tx.send_replace(Some(classification));
        }
    }

    /// Wake waiters with `Unclassified` but keep nothing, so the next run
    /// asks the provider again.
    pub fn abandon(mut self) {
        lock(&self.slots).remove(&self.key);
        if let Some(tx) = self.tx.take() {
            tx.send_replace(Some(Classification::Unclassified));
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if self.tx.take().is_some() {
            let mut slots = lock(&self.slots);
            if matches!(slots.get(&self.key), Some(Slot::InFlight(_))) {
                slots.remove(&self.key);
            }
        }
    }
}

fn lock(slots: &Mutex<HashMap<String, Slot>>) -> MutexGuard<'_, HashMap<String, Slot>> {
    slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ClassificationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from a persisted snapshot.
    pub fn from_snapshot(entries: BTreeMap<String, String>) -> Self {
        let cache = Self::new();
        {
            let mut slots = lock(&cache.slots);
            for (key, category) in entries {
                slots.insert(key, Slot::Ready(Classification::Category(category)));
            }
        }
        cache
    }

    pub fn lookup(&self, key: &str) -> Lookup {
        let mut slots = lock(&self.slots);
        match slots.get(key) {
            Some(Slot::Ready(c)) => Lookup::Hit(c.clone()),
            Some(Slot::InFlight(rx)) => Lookup::Wait(Waiter { rx: rx.clone() }),
            None => {
                let (tx, rx) = watch::channel(None);
                slots.insert(key.to_string(), Slot::InFlight(rx));
                Lookup::Claimed(InFlight {
                    key: key.to_string(),
                    tx: Some(tx),
                    slots: Arc::clone(&self.slots),
                })
            }
        }
    }

    /// Ready entries only; in-flight keys are not visible.
    pub fn get(&self, key: &str) -> Option<Classification> {
        match lock(&self.slots).get(key) {
            Some(Slot::Ready(c)) => Some(c.clone()),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.slots)
            .values()
            .filter(|s| matches!(s, Slot::Ready(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Categorized entries in key order. `Unclassified` answers are left out
    /// so a later run with a different category list can retry them.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        lock(&self.slots)
            .iter()
            .filter_map(|(k, s)| match s {
                Slot::Ready(Classification::Category(c)) => Some((k.clone(), c.clone())),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claim(cache: &ClassificationCache, key: &str) -> InFlight {
        match cache.lookup(key) {
            Lookup::Claimed(f) => f,
            _ => panic!("expected a claim for {key}"),
        }
    }

    #[test]
    fn miss_claims_then_hits_after_complete() {
        let cache = ClassificationCache::new();
        let flight = claim(&cache, "posto shell");
        assert_eq!(flight.key(), "posto shell");
        assert!(cache.get("posto shell").is_none());

        flight.complete(Classification::Category("Transporte".into()));
        match cache.lookup("posto shell") {
            Lookup::Hit(c) => assert_eq!(c, Classification::Category("Transporte".into())),
            _ => panic!("expected hit"),
        }
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn second_lookup_waits_for_first() {
        let cache = ClassificationCache::new();
        let flight = claim(&cache, "ifood");
        let waiter = match cache.lookup("ifood") {
            Lookup::Wait(w) => w,
            _ => panic!("expected wait"),
        };
        let handle = tokio::spawn(waiter.wait());
        flight.complete(Classification::Category("Alimentação".into()));
        assert_eq!(
            handle.await.unwrap(),
            Classification::Category("Alimentação".into())
        );
    }

    #[tokio::test]
    async fn abandon_wakes_waiters_and_frees_key() {
        let cache = ClassificationCache::new();
        let flight = claim(&cache, "xpto");
        let waiter = match cache.lookup("xpto") {
            Lookup::Wait(w) => w,
            _ => panic!("expected wait"),
        };
        flight.abandon();
        assert_eq!(waiter.wait().await, Classification::Unclassified);
        assert!(matches!(cache.lookup("xpto"), Lookup::Claimed(_)));
    }

    #[tokio::test]
    async fn dropped_claim_releases_key() {
        let cache = ClassificationCache::new();
        let waiter = {
            let _flight = claim(&cache, "xpto");
            match cache.lookup("xpto") {
                Lookup::Wait(w) => w,
                _ => panic!("expected wait"),
            }
        };
        assert_eq!(waiter.wait().await, Classification::Unclassified);
        assert!(cache.is_empty());
        assert!(matches!(cache.lookup("xpto"), Lookup::Claimed(_)));
    }

    #[test]
    fn snapshot_round_trip_skips_unclassified() {
        let cache = ClassificationCache::new();
        claim(&cache, "a").complete(Classification::Category("Lazer".into()));
        claim(&cache, "b").complete(Classification::Unclassified);

        let snap = cache.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap["a"], "Lazer");

        let restored = ClassificationCache::from_snapshot(snap);
        assert_eq!(restored.get("a"), Some(Classification::Category("Lazer".into())));
        assert!(restored.get("b").is_none());
    }
}
