//! §4.5 CRDT Document — a single shared text buffer per room, built on
//! `yrs` (the Rust port of Yjs). Update/state-vector encodings are the
//! library's stable on-the-wire format, so two processes that only ever
//! exchange encoded bytes converge identically (§4.5a).

use thiserror::Error;
use yrs::types::text::Delta;
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{Doc, GetString, Observable, ReadTxn, StateVector, Subscription, Text, TextRef, Transact, Update};

/// Reserved clientId for the deterministic initial-content seed (§4.5, §6.5).
/// Every replica seeding a room from the same `FileRecord` content produces
/// the identical operation id under this clientId, so the resulting state
/// vectors match across independently-seeded processes.
pub const SEED_CLIENT_ID: u64 = 0xFFFF_FFFF;

#[derive(Debug, Error)]
pub enum CrdtError {
    #[error("failed to decode CRDT payload: {0}")]
    Decode(String),
    #[error("failed to apply update: {0}")]
    Apply(String),
}

/// A causally-new range reported by `observe`: sufficient for a client to
/// compute an undo entry without replaying the whole document (§4.5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChange {
    pub position: u32,
    pub inserted: String,
    pub deleted_len: u32,
}

/// Wraps a `yrs::Doc` holding a single named text value. The Room owns
/// exactly one of these per file (§3.5); all access happens inside the
/// Room's single execution lane (§4.4a), so no internal locking is needed
/// here.
pub struct CrdtDocument {
    doc: Doc,
    text: TextRef,
}

impl CrdtDocument {
    pub fn new() -> Self {
        let doc = Doc::new();
        let text = doc.get_or_insert_text("content");
        Self { doc, text }
    }

    /// Builds a document seeded with `content` via the reserved seed
    /// clientId, then folds that seed into a document with an ordinary
    /// (random) clientId — the seed's operation id is what must match
    /// across replicas, not the document's own id (§4.5 Initialization).
    pub fn seeded(content: &str) -> Self {
        let mut target = Self::new();
        if content.is_empty() {
            return target;
        }

        let seed_doc = Doc::with_client_id(SEED_CLIENT_ID);
        let seed_text = seed_doc.get_or_insert_text("content");
        {
            let mut txn = seed_doc.transact_mut();
            seed_text.insert(&mut txn, 0, content);
        }
        let seed_update = {
            let txn = seed_doc.transact();
            txn.encode_state_as_update_v1(&StateVector::default())
        };

        target
            .apply(&seed_update)
            .expect("a freshly encoded seed update is always well-formed");
        target
    }

    /// Serializes current content for persistence (§4.8) or for seeding a
    /// new room (`toText`).
    pub fn to_text(&self) -> String {
        let txn = self.doc.transact();
        self.text.get_string(&txn)
    }

    /// The causal summary of what this replica has observed, used by a
    /// peer to compute the minimal catch-up delta.
    pub fn state_vector(&self) -> Vec<u8> {
        let txn = self.doc.transact();
        txn.state_vector().encode_v1()
    }

    /// The full document state, equivalent to a diff against an empty peer.
    /// Used for `SyncStep2` when a subscriber has no prior state vector to
    /// offer.
    pub fn encode_full(&self) -> Vec<u8> {
        let txn = self.doc.transact();
        txn.encode_state_as_update_v1(&StateVector::default())
    }

    /// The minimal update bringing a peer at `their_state_vector` to the
    /// current state.
    pub fn encode_diff(&self, their_state_vector: &[u8]) -> Result<Vec<u8>, CrdtError> {
        let sv = StateVector::decode_v1(their_state_vector)
            .map_err(|e| CrdtError::Decode(e.to_string()))?;
        let txn = self.doc.transact();
        Ok(txn.encode_state_as_update_v1(&sv))
    }

    /// Applies a peer's update. Idempotent: re-applying an update whose
    /// operations are already part of the state vector changes nothing
    /// (§8 idempotence law).
    pub fn apply(&mut self, update: &[u8]) -> Result<(), CrdtError> {
        let update = Update::decode_v1(update).map_err(|e| CrdtError::Decode(e.to_string()))?;
        let mut txn = self.doc.transact_mut();
        txn.apply_update(update)
            .map_err(|e| CrdtError::Apply(e.to_string()))
    }

    /// Registers a callback invoked after every local or remote `apply`
    /// with the causally-new range(s) it introduced. The returned
    /// `Subscription` must be kept alive for as long as observation should
    /// continue — dropping it unregisters the callback.
    pub fn observe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(TextChange) + 'static,
    {
        self.text.observe(move |txn, event| {
            let mut position: u32 = 0;
            for delta in event.delta(txn) {
                match delta {
                    Delta::Retain(len, _) => position += *len,
                    Delta::Inserted(value, _) => {
                        let inserted = value.to_string();
                        let advance = inserted.encode_utf16().count() as u32;
                        callback(TextChange {
                            position,
                            inserted,
                            deleted_len: 0,
                        });
                        position += advance;
                    }
                    Delta::Deleted(len) => {
                        callback(TextChange {
                            position,
                            inserted: String::new(),
                            deleted_len: *len,
                        });
                    }
                }
            }
        })
    }
}

impl Default for CrdtDocument {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_has_no_text() {
        let doc = CrdtDocument::new();
        assert_eq!(doc.to_text(), "");
    }

    #[test]
    fn seeded_document_carries_initial_content() {
        let doc = CrdtDocument::seeded("hello");
        assert_eq!(doc.to_text(), "hello");
    }

    #[test]
    fn two_independent_seeds_of_the_same_content_converge() {
        // §4.5 Initialization: the seed must be deterministic across
        // independently-constructed replicas.
        let a = CrdtDocument::seeded("hello, world");
        let b = CrdtDocument::seeded("hello, world");
        assert_eq!(a.state_vector(), b.state_vector());
        assert_eq!(a.to_text(), b.to_text());
    }

    #[test]
    fn apply_full_state_reproduces_content() {
        let mut source = CrdtDocument::new();
        {
            let mut txn = source.doc.transact_mut();
            source.text.insert(&mut txn, 0, "hello");
        }
        let update = {
            let txn = source.doc.transact();
            txn.encode_state_as_update_v1(&StateVector::default())
        };

        let mut target = CrdtDocument::new();
        target.apply(&update).unwrap();
        assert_eq!(target.to_text(), "hello");
    }

    #[test]
    fn encode_diff_is_empty_when_peer_is_current() {
        let doc = CrdtDocument::seeded("abc");
        let sv = doc.state_vector();
        let diff = doc.encode_diff(&sv).unwrap();
        let mut peer = CrdtDocument::seeded("abc");
        peer.apply(&diff).unwrap();
        assert_eq!(peer.to_text(), "abc");
    }

    #[test]
    fn apply_is_idempotent() {
        let mut source = CrdtDocument::new();
        {
            let mut txn = source.doc.transact_mut();
            source.text.insert(&mut txn, 0, "x");
        }
        let update = {
            let txn = source.doc.transact();
            txn.encode_state_as_update_v1(&StateVector::default())
        };

        let mut target = CrdtDocument::new();
        target.apply(&update).unwrap();
        let sv1 = target.state_vector();
        target.apply(&update).unwrap();
        let sv2 = target.state_vector();
        assert_eq!(sv1, sv2);
        assert_eq!(target.to_text(), "x");
    }

    #[test]
    fn observe_reports_inserted_range() {
        let doc = CrdtDocument::new();
        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        let _sub = doc.observe(move |change| seen2.lock().unwrap().push(change));

        {
            let mut txn = doc.doc.transact_mut();
            doc.text.insert(&mut txn, 0, "hi");
        }

        let events = seen.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].position, 0);
        assert_eq!(events[0].inserted, "hi");
        assert_eq!(events[0].deleted_len, 0);
    }
}
