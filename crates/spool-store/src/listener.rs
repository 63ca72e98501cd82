//! Spills live sends that failed with a retryable outcome.

use std::sync::Arc;

use spool_common::InstrumentationKey;
use tracing::debug;

use crate::pipeline::{DeliveryListener, DeliveryOutcome};
use crate::writer::{PersistOutcome, Writer};

/// Completion listener for live sends. The only creator of `.trn` files.
pub struct SpillListener {
    writer: Arc<Writer>,
}

impl SpillListener {
    pub fn new(writer: Arc<Writer>) -> Self {
        SpillListener { writer }
    }

    /// Spill the batch if `outcome` is retryable. Returns `None` otherwise.
    pub fn spill(
        &self,
        payload: &[u8],
        key: &InstrumentationKey,
        outcome: &DeliveryOutcome,
    ) -> Option<PersistOutcome> {
        if !outcome.is_retryable() {
            return None;
        }
        debug!(op = "spill", outcome = %outcome, bytes = payload.len(), "spilling failed batch");
        Some(self.writer.persist(key, payload))
    }
}

impl DeliveryListener for SpillListener {
    fn on_complete(&self, payload: &[u8], key: &InstrumentationKey, outcome: &DeliveryOutcome) {
        let _ = self.spill(payload, key, outcome);
    }
}
