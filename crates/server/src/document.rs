use std::collections::HashMap;

use tracing::{debug, warn};

use model::{Operation, SongDocument, apply_batch};

/// Result of one accepted batch: what to rebroadcast and at which revision.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyOutcome {
    pub operations: Vec<Operation>,
    pub revision: u64,
    pub structural: bool,
}

/// Store of canonical sequencer documents, keyed by document id.
///
/// The sole mutator of every document. A batch is all-or-nothing at the
/// revision level: either at least one well-formed operation applies and the
/// revision bumps exactly once, or nothing happens at all.
#[derive(Debug, Default)]
pub struct DocumentStore {
    documents: HashMap<String, SongDocument>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetches a document, creating it on first reference.
    pub fn get_or_create(&mut self, id: &str) -> &SongDocument {
        self.documents
            .entry(id.to_owned())
            .or_insert_with(|| SongDocument::new(id))
    }

    pub fn get(&self, id: &str) -> Option<&SongDocument> {
        self.documents.get(id)
    }

    /// Applies a client batch against the canonical document.
    ///
    /// A stale `client_revision` is deliberately tolerated: the batch still
    /// applies and the result is rebroadcast to everyone, the stale sender
    /// included, so convergence comes from repeated deterministic clamping
    /// rather than causal ordering.
    pub fn apply_ops(
        &mut self,
        id: &str,
        client_revision: u64,
        operations: &[Operation],
    ) -> Option<ApplyOutcome> {
        let doc = self
            .documents
            .entry(id.to_owned())
            .or_insert_with(|| SongDocument::new(id));

        if client_revision != doc.revision {
            warn!(
                document = %id,
                client_revision,
                revision = doc.revision,
                "stale client revision tolerated"
            );
        }

        let outcome = apply_batch(doc, operations);
        if outcome.is_empty() {
            return None;
        }

        doc.revision += 1;
        debug!(
            document = %id,
            revision = doc.revision,
            applied = outcome.applied.len(),
            structural = outcome.structural,
            "batch applied"
        );
        Some(ApplyOutcome {
            operations: outcome.applied,
            revision: doc.revision,
            structural: outcome.structural,
        })
    }
}
