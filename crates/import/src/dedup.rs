use std::collections::HashMap;

use chrono::NaiveDate;

use tally_core::{Owner, Transaction};

use crate::util::{normalize, similarity};

pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.85;

/// A candidate matched an already-stored transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateHit {
    pub existing_id: String,
    /// 1.0 for an exact description match, otherwise the fuzzy score.
    pub score: f32,
}

/// Decides whether a candidate transaction already exists in the store.
///
/// The exact signal is the `(date, amount, owner)` triple; description
/// similarity resolves near-identical wording across export formats. The
/// supplied window is indexed by that triple at construction, so each check
/// touches a single bucket rather than rescanning the window — the store is
/// expected to pre-filter by date range before handing the window over.
pub struct DuplicateDetector {
    index: HashMap<(NaiveDate, i64, Owner), Vec<(String, String)>>,
    threshold: f32,
}

impl DuplicateDetector {
    pub fn new(window: &[Transaction]) -> Self {
        Self::with_threshold(window, DEFAULT_SIMILARITY_THRESHOLD)
    }

    pub fn with_threshold(window: &[Transaction], threshold: f32) -> Self {
        let mut detector = Self { index: HashMap::new(), threshold };
        for tx in window {
            detector.insert(tx);
        }
        detector
    }

    /// Add a transaction to the comparison window. The pipeline inserts each
    /// accepted transaction so a row appearing twice in one statement is
    /// caught as well.
    pub fn insert(&mut self, tx: &Transaction) {
        self.index
            .entry(Self::key(tx))
            .or_default()
            .push((tx.id.clone(), normalize(&tx.description)));
    }

    /// `Some(hit)` when the candidate duplicates a stored transaction.
    /// Deterministic: exact description matches are preferred, then the first
    /// stored transaction (insertion order) clearing the fuzzy threshold.
    pub fn check(&self, candidate: &Transaction) -> Option<DuplicateHit> {
        let bucket = self.index.get(&Self::key(candidate))?;
        let wanted = normalize(&candidate.description);

        for (id, description) in bucket {
            if *description == wanted {
                return Some(DuplicateHit { existing_id: id.clone(), score: 1.0 });
            }
        }
        for (id, description) in bucket {
            let score = similarity(description, &wanted);
            if score >= self.threshold {
                return Some(DuplicateHit { existing_id: id.clone(), score });
            }
        }
        None
    }

    fn key(tx: &Transaction) -> (NaiveDate, i64, Owner) {
        (tx.date, tx.amount.to_cents(), tx.owner)
    }
}
