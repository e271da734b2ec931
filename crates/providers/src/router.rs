//! Role → model routing.
//!
//! Model ids are `provider/model` (e.g. `openai/gpt-4o`); the router splits
//! off the provider prefix, looks up the adapter instance, and hands the
//! engine a [`ResolvedModel`]. Role assignments can be swapped at runtime
//! (`reassign_model` takes effect at the next turn).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use agora_domain::config::ModelAssignments;
use agora_domain::error::{Error, Result};

use crate::traits::LlmProvider;

/// A provider instance plus the bare model name to request from it.
#[derive(Clone)]
pub struct ResolvedModel {
    pub provider: Arc<dyn LlmProvider>,
    /// Model name without the provider prefix.
    pub model: String,
    /// The full id as assigned (`provider/model`), for metadata.
    pub model_id: String,
}

pub struct ModelRouter {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    assignments: RwLock<ModelAssignments>,
}

impl ModelRouter {
    pub fn new(assignments: ModelAssignments) -> Self {
        Self {
            providers: HashMap::new(),
            assignments: RwLock::new(assignments),
        }
    }

    /// Register a provider instance under its `provider_id`.
    pub fn register(&mut self, provider: Arc<dyn LlmProvider>) {
        self.providers
            .insert(provider.provider_id().to_string(), provider);
    }

    /// Resolve the provider+model for a speaker route key
    /// (`pro`, `chair.skeptic`, …).
    pub fn resolve(&self, route: &str) -> Result<ResolvedModel> {
        let model_id = self.assignments.read().for_route(route).to_string();
        self.resolve_model_id(&model_id)
    }

    /// Resolve a concrete `provider/model` id.
    pub fn resolve_model_id(&self, model_id: &str) -> Result<ResolvedModel> {
        if let Some((prefix, model)) = model_id.split_once('/') {
            if let Some(provider) = self.providers.get(prefix) {
                return Ok(ResolvedModel {
                    provider: provider.clone(),
                    model: model.to_string(),
                    model_id: model_id.to_string(),
                });
            }
        }
        // No prefix match: with exactly one registered provider, the whole
        // id routes to it.
        if self.providers.len() == 1 {
            let provider = self.providers.values().next().cloned();
            if let Some(provider) = provider {
                return Ok(ResolvedModel {
                    provider,
                    model: model_id.to_string(),
                    model_id: model_id.to_string(),
                });
            }
        }
        Err(Error::NotFound(format!(
            "no provider registered for model id {model_id}"
        )))
    }

    /// Swap the model assigned to a role. Applied at the next resolve.
    pub fn reassign(&self, route: &str, model_id: String) {
        tracing::info!(route, model = %model_id, "model reassigned");
        self.assignments.write().assign(route, model_id);
    }

    /// Snapshot of the current assignments.
    pub fn assignments(&self) -> ModelAssignments {
        self.assignments.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::ScriptedProvider;

    fn router_with(provider: ScriptedProvider) -> ModelRouter {
        let mut router = ModelRouter::new(ModelAssignments::default());
        router.register(Arc::new(provider));
        router
    }

    #[test]
    fn resolves_prefixed_model_id() {
        let mut router = ModelRouter::new(ModelAssignments::default());
        router.register(Arc::new(ScriptedProvider::new("openai")));
        let resolved = router.resolve_model_id("openai/gpt-4o").unwrap();
        assert_eq!(resolved.model, "gpt-4o");
        assert_eq!(resolved.model_id, "openai/gpt-4o");
    }

    #[test]
    fn single_provider_fallback() {
        let router = router_with(ScriptedProvider::new("mock"));
        // "openai/gpt-4o" has no matching prefix, but only one provider
        // exists, so it takes the call.
        let resolved = router.resolve("pro").unwrap();
        assert_eq!(resolved.provider.provider_id(), "mock");
    }

    #[test]
    fn reassign_applies_to_next_resolve() {
        let mut router = ModelRouter::new(ModelAssignments::default());
        router.register(Arc::new(ScriptedProvider::new("openai")));
        router.register(Arc::new(ScriptedProvider::new("anthropic")));

        router.reassign("pro", "anthropic/claude-sonnet".into());
        let resolved = router.resolve("pro").unwrap();
        assert_eq!(resolved.provider.provider_id(), "anthropic");
        assert_eq!(resolved.model, "claude-sonnet");
    }

    #[test]
    fn unknown_provider_prefix_errors() {
        let mut router = ModelRouter::new(ModelAssignments::default());
        router.register(Arc::new(ScriptedProvider::new("openai")));
        router.register(Arc::new(ScriptedProvider::new("anthropic")));
        assert!(matches!(
            router.resolve_model_id("nope/model"),
            Err(Error::NotFound(_))
        ));
    }
}
