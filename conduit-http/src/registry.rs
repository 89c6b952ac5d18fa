//! Process-wide registry of in-flight requests.
//!
//! At most one execution per [`Fingerprint`] may be in flight. The owner holds
//! a [`Registration`] that removes the entry when released or dropped; late
//! arrivals get an [`InFlight`] they can await until that happens.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;

static GLOBAL: Lazy<Arc<InFlightRegistry>> = Lazy::new(|| Arc::new(InFlightRegistry::new()));

/// Identity of a request for deduplication.
///
/// Derived from the URL and the serialized query and body parameters.
/// Headers are not part of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(u64);

impl Fingerprint {
    /// Combine a URL with its serialized parameter sets.
    pub fn of(url: &str, params: &str, body_params: &str) -> Self {
        let mut hasher = DefaultHasher::new();
        url.hash(&mut hasher);
        params.hash(&mut hasher);
        body_params.hash(&mut hasher);
        Self(hasher.finish())
    }

    /// Raw hash value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

struct Entry {
    owner: u64,
    // Dropping the sender releases every waiter.
    done: watch::Sender<()>,
}

/// Concurrency-safe map from fingerprint to the execution that owns it.
#[derive(Default)]
pub struct InFlightRegistry {
    entries: Mutex<HashMap<Fingerprint, Entry>>,
    next_owner: AtomicU64,
}

impl InFlightRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry shared by every executor in the process.
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL)
    }

    /// Atomically claim `fingerprint`.
    ///
    /// Fails with an [`InFlight`] waiter when another execution owns it.
    pub fn try_register(self: &Arc<Self>, fingerprint: Fingerprint) -> Result<Registration, InFlight> {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get(&fingerprint) {
            return Err(InFlight {
                fingerprint,
                done: entry.done.subscribe(),
            });
        }

        let owner = self.next_owner.fetch_add(1, Ordering::Relaxed);
        let (done, _) = watch::channel(());
        entries.insert(fingerprint, Entry { owner, done });

        Ok(Registration {
            registry: Arc::clone(self),
            fingerprint,
            owner,
            active: true,
        })
    }

    /// Whether `fingerprint` is currently in flight.
    pub fn contains(&self, fingerprint: Fingerprint) -> bool {
        self.entries.lock().contains_key(&fingerprint)
    }

    /// Number of in-flight entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True when nothing is in flight.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn remove(&self, fingerprint: Fingerprint, owner: u64) -> bool {
        let mut entries = self.entries.lock();
        match entries.get(&fingerprint) {
            Some(entry) if entry.owner == owner => entries.remove(&fingerprint).is_some(),
            _ => false,
        }
    }
}

impl fmt::Debug for InFlightRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InFlightRegistry")
            .field("in_flight", &self.len())
            .finish()
    }
}

/// Ownership of a registry entry. Removes it when released or dropped.
#[must_use = "dropping a registration removes the entry immediately"]
pub struct Registration {
    registry: Arc<InFlightRegistry>,
    fingerprint: Fingerprint,
    owner: u64,
    active: bool,
}

impl Registration {
    /// The claimed fingerprint.
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// Remove the entry now and wake every waiter.
    pub fn release(mut self) {
        self.unregister();
    }

    fn unregister(&mut self) {
        if std::mem::take(&mut self.active) {
            self.registry.remove(self.fingerprint, self.owner);
        }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.unregister();
    }
}

/// Waiter for an execution owned by someone else.
pub struct InFlight {
    fingerprint: Fingerprint,
    done: watch::Receiver<()>,
}

impl InFlight {
    /// The fingerprint being waited on.
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// Resolve once the owning execution has been unregistered.
    pub async fn wait(mut self) {
        while self.done.changed().await.is_ok() {}
    }
}
