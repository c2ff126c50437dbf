// Thought signature cache for replaying reasoning blocks
//
// Some vendors attach an opaque signature to reasoning output and require
// it back when that reasoning is resubmitted in a later turn. The cache is
// keyed by (model family, thinking text) so e.g. all Gemini variants share
// entries. Models outside a known family key by their full name instead,
// so two unrecognized models never see each other's signatures.

use crate::models::model_group;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

/// In-memory signature cache, owned by the orchestrator and injected into
/// the translators. Overwrite-by-key is the only eviction.
#[derive(Default)]
pub struct SignatureCache {
    entries: RwLock<HashMap<(String, String), String>>,
}

fn family_key(model: &str) -> String {
    match model_group(model) {
        "unknown" => model.to_string(),
        group => group.to_string(),
    }
}

impl SignatureCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the signature a provider returned for a reasoning block.
    pub fn store(&self, model: &str, thinking_text: &str, signature: &str) {
        let key = (family_key(model), thinking_text.to_string());
        debug!(
            family = key.0.as_str(),
            sig_len = signature.len(),
            "storing thought signature"
        );
        self.entries.write().insert(key, signature.to_string());
    }

    /// Look up the signature for previously seen reasoning text.
    pub fn get(&self, model: &str, thinking_text: &str) -> Option<String> {
        let key = (family_key(model), thinking_text.to_string());
        self.entries.read().get(&key).cloned()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }
}
