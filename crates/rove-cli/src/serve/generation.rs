//! The currently served build generation.
//!
//! Requests clone the `Arc` once and serve the whole response from that
//! snapshot; publishing swaps the pointer. The lock is held only for the
//! pointer copy, so a rebuild never blocks a request.

use crate::serve::manifest::Manifest;
use parking_lot::RwLock;
use std::sync::Arc;

/// Immutable snapshot of build output.
#[derive(Debug)]
pub struct BuildGeneration {
    pub id: u64,
    pub manifest: Arc<Manifest>,
}

impl BuildGeneration {
    /// Generation 0: nothing has been built yet.
    pub fn empty() -> Self {
        Self {
            id: 0,
            manifest: Arc::new(Manifest::new()),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.id > 0
    }
}

#[derive(Debug)]
pub struct GenerationStore {
    current: RwLock<Arc<BuildGeneration>>,
}

impl GenerationStore {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(BuildGeneration::empty())),
        }
    }

    pub fn current(&self) -> Arc<BuildGeneration> {
        Arc::clone(&self.current.read())
    }

    pub fn current_id(&self) -> u64 {
        self.current.read().id
    }

    /// Make `manifest` the served output.
    ///
    /// Ids not newer than the current one are rejected so the visible
    /// generation never goes backwards. Returns whether it was published.
    pub fn publish(&self, id: u64, manifest: Arc<Manifest>) -> bool {
        let next = Arc::new(BuildGeneration { id, manifest });
        let mut current = self.current.write();
        if id <= current.id {
            tracing::debug!(id, current = current.id, "Ignoring stale generation");
            return false;
        }
        *current = next;
        true
    }
}

impl Default for GenerationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(body: &str) -> Arc<Manifest> {
        let mut m = Manifest::new();
        m.insert("/index.html", body.to_string());
        Arc::new(m)
    }

    #[test]
    fn test_starts_at_empty_generation() {
        let store = GenerationStore::new();
        let current = store.current();
        assert_eq!(current.id, 0);
        assert!(!current.is_ready());
        assert!(current.manifest.is_empty());
    }

    #[test]
    fn test_publish_advances() {
        let store = GenerationStore::new();
        assert!(store.publish(1, manifest("one")));
        assert_eq!(store.current_id(), 1);
        assert!(store.current().is_ready());
    }

    #[test]
    fn test_generation_never_goes_backwards() {
        let store = GenerationStore::new();
        assert!(store.publish(3, manifest("three")));
        assert!(!store.publish(2, manifest("two")));
        assert!(!store.publish(3, manifest("again")));
        assert_eq!(store.current_id(), 3);
        assert_eq!(
            &store.current().manifest.get("/index.html").unwrap().bytes[..],
            b"three"
        );
    }

    #[test]
    fn test_in_flight_snapshot_survives_publish() {
        let store = GenerationStore::new();
        store.publish(1, manifest("one"));

        let held = store.current();
        store.publish(2, manifest("two"));

        assert_eq!(held.id, 1);
        assert_eq!(&held.manifest.get("/index.html").unwrap().bytes[..], b"one");
        assert_eq!(store.current_id(), 2);
    }
}
