use std::sync::Arc;

use alloy::rpc::types::Log;
use tracing::trace;

use crate::{
    classifier::LogClassifier,
    collaborators::{Collaborators, TransactionSink},
    engine::{Admission, DedupEngine},
    registry::ChainState,
};

/// The per-log path shared by live and backfill deliveries: admit, classify, emit.
///
/// The dedup key is recorded at admission, before the (async) classification, since the chain
/// lock cannot be held across it. Classification cannot fail, so every admitted log is emitted
/// exactly once.
#[derive(Clone)]
pub struct LogProcessor {
    state: Arc<ChainState>,
    engine: DedupEngine,
    classifier: LogClassifier,
    sink: Arc<dyn TransactionSink>,
}

impl LogProcessor {
    #[must_use]
    pub fn new(
        state: Arc<ChainState>,
        engine: DedupEngine,
        classifier: LogClassifier,
        sink: Arc<dyn TransactionSink>,
    ) -> Self {
        Self { state, engine, classifier, sink }
    }

    #[must_use]
    pub fn from_collaborators(
        state: Arc<ChainState>,
        engine: DedupEngine,
        collaborators: &Collaborators,
    ) -> Self {
        let classifier = LogClassifier::new(
            Arc::clone(&collaborators.prices),
            Arc::clone(&collaborators.signatures),
        );
        Self::new(state, engine, classifier, Arc::clone(&collaborators.sink))
    }

    #[must_use]
    pub fn state(&self) -> &Arc<ChainState> {
        &self.state
    }

    pub async fn process(&self, log: &Log) -> Admission {
        let admission = self.engine.admit(&self.state, log);
        match admission {
            Admission::Accept(key) => {
                let transaction = self.classifier.classify(self.state.config(), log).await;
                trace!(chain = %self.state.name(), %key, kind = %transaction.kind, "Emitting transaction");
                self.sink.emit(transaction);
            }
            Admission::Duplicate => {
                trace!(chain = %self.state.name(), block_number = ?log.block_number, "Duplicate log dropped");
            }
            Admission::ReorgSignal { .. } | Admission::Malformed => {}
        }
        admission
    }
}
