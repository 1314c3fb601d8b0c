//! Holds instantiated providers and role assignments. Construction of
//! concrete providers is entirely the embedder's job — this registry only
//! indexes whatever `Arc<dyn Provider>` instances it is handed.

use std::collections::HashMap;
use std::sync::Arc;

use opal_domain::capability::{Capabilities, ModelRole};
use opal_domain::error::{Error, Result};

use crate::traits::Provider;

#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
    roles: HashMap<ModelRole, String>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        self.providers.insert(provider.provider_id().to_string(), provider);
    }

    pub fn assign_role(&mut self, role: ModelRole, provider_id: impl Into<String>) {
        self.roles.insert(role, provider_id.into());
    }

    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(provider_id).cloned()
    }

    pub fn by_role(&self, role: ModelRole) -> Option<Arc<dyn Provider>> {
        self.roles.get(&role).and_then(|id| self.get(id))
    }

    /// Five-tier resolution order for an agent's turn (grounded on the
    /// gateway's `resolve_provider`): explicit id override, then the
    /// agent-assigned role, then any registered provider at all.
    pub fn resolve(&self, explicit_id: Option<&str>, role: Option<ModelRole>) -> Result<Arc<dyn Provider>> {
        if let Some(id) = explicit_id {
            if let Some(p) = self.get(id) {
                return Ok(p);
            }
            return Err(Error::Config(format!("provider not found: {id}")));
        }
        if let Some(role) = role {
            if let Some(p) = self.by_role(role) {
                return Ok(p);
            }
        }
        self.providers
            .values()
            .next()
            .cloned()
            .ok_or_else(|| Error::Config("no providers configured".into()))
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// List every registered provider's id and advertised capabilities
    ///.
    pub fn list(&self) -> Vec<(String, Capabilities)> {
        self.providers.values().map(|p| (p.provider_id().to_string(), p.capabilities().clone())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{ChatRequest, ChatResponse};
    use async_trait::async_trait;
    use opal_domain::capability::Capabilities;
    use opal_domain::error::Result as DomainResult;
    use opal_domain::stream::{BoxStream, ProviderStreamEvent};

    struct StubProvider {
        id: String,
        caps: Capabilities,
    }

    #[async_trait]
    impl Provider for StubProvider {
        async fn chat(&self, _req: ChatRequest) -> DomainResult<ChatResponse> {
            unimplemented!("not exercised in these tests")
        }
        async fn chat_stream(
            &self,
            _req: ChatRequest,
        ) -> DomainResult<BoxStream<'static, DomainResult<ProviderStreamEvent>>> {
            unimplemented!("not exercised in these tests")
        }
        fn capabilities(&self) -> &Capabilities {
            &self.caps
        }
        fn provider_id(&self) -> &str {
            &self.id
        }
    }

    fn stub(id: &str) -> Arc<dyn Provider> {
        Arc::new(StubProvider { id: id.to_string(), caps: Capabilities::default() })
    }

    #[test]
    fn resolve_prefers_explicit_id_over_role() {
        let mut reg = ProviderRegistry::new();
        reg.register(stub("a"));
        reg.register(stub("b"));
        reg.assign_role(ModelRole::Executor, "b");
        let p = reg.resolve(Some("a"), Some(ModelRole::Executor)).unwrap();
        assert_eq!(p.provider_id(), "a");
    }

    #[test]
    fn resolve_falls_back_to_role_then_any() {
        let mut reg = ProviderRegistry::new();
        reg.register(stub("a"));
        reg.assign_role(ModelRole::Summarizer, "a");
        let p = reg.resolve(None, Some(ModelRole::Summarizer)).unwrap();
        assert_eq!(p.provider_id(), "a");

        let p = reg.resolve(None, None).unwrap();
        assert_eq!(p.provider_id(), "a");
    }

    #[test]
    fn resolve_errors_on_unknown_explicit_id() {
        let reg = ProviderRegistry::new();
        assert!(reg.resolve(Some("missing"), None).is_err());
    }

    #[test]
    fn resolve_errors_when_registry_empty() {
        let reg = ProviderRegistry::new();
        assert!(reg.resolve(None, None).is_err());
    }
}
