//! Resolves `HandlerReference`s to executable handlers and caches the
//! result for the process lifetime.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::instrument;

use crate::domain::models::{HandlerReference, ResolvedHandler};
use crate::domain::ports::TypeResolver;

/// Process-wide cache of resolved handlers, keyed by the full
/// `HandlerReference` (including instance payload) so stateful handlers
/// with different payloads never alias.
pub struct HandlerRegistry {
    resolver: Arc<dyn TypeResolver>,
    cache: RwLock<HashMap<HandlerReference, Arc<ResolvedHandler>>>,
}

impl HandlerRegistry {
    #[must_use]
    pub fn new(resolver: Arc<dyn TypeResolver>) -> Self {
        Self {
            resolver,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve `reference` to a handler. Returns `None` (not an error) on
    /// a miss, so callers can record `last_error = "Missing or invalid
    /// handler"` and treat the attempt as unsuccessful.
    #[instrument(skip(self))]
    pub async fn resolve(&self, reference: &HandlerReference) -> Option<Arc<ResolvedHandler>> {
        if let Some(cached) = self.cache.read().await.get(reference) {
            return Some(Arc::clone(cached));
        }

        let (handler, hooks) = self.resolver.find_type_by_name(&reference.qualified_name())?;
        let resolved = Arc::new(ResolvedHandler::new(handler, hooks));

        let mut cache = self.cache.write().await;
        // Idempotent insert: a concurrent resolver may have won the race
        // already; either value is equivalent, so keep whichever is there.
        let entry = cache
            .entry(reference.clone())
            .or_insert_with(|| Arc::clone(&resolved));
        Some(Arc::clone(entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::domain::models::{Handler, HandlerHooks};

    struct EchoHandler;

    #[async_trait]
    impl Handler for EchoHandler {
        async fn perform(&self) -> bool {
            true
        }
    }

    struct StubResolver;

    impl TypeResolver for StubResolver {
        fn find_type_by_name(&self, qualified_name: &str) -> Option<(Box<dyn Handler>, HandlerHooks)> {
            if qualified_name == "demo.echo" {
                Some((Box::new(EchoHandler), HandlerHooks::default()))
            } else {
                None
            }
        }
    }

    #[tokio::test]
    async fn resolve_returns_none_for_unknown_reference() {
        let registry = HandlerRegistry::new(Arc::new(StubResolver));
        let reference = HandlerReference::new("demo", "missing");
        assert!(registry.resolve(&reference).await.is_none());
    }

    #[tokio::test]
    async fn resolve_caches_by_full_reference() {
        let registry = HandlerRegistry::new(Arc::new(StubResolver));
        let reference = HandlerReference::new("demo", "echo");

        let first = registry.resolve(&reference).await.unwrap();
        let second = registry.resolve(&reference).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn resolve_does_not_alias_distinct_payloads() {
        let registry = HandlerRegistry::new(Arc::new(StubResolver));
        let a = HandlerReference::new("demo", "echo").with_payload("a");
        let b = HandlerReference::new("demo", "echo").with_payload("b");

        let resolved_a = registry.resolve(&a).await.unwrap();
        let resolved_b = registry.resolve(&b).await.unwrap();
        assert!(!Arc::ptr_eq(&resolved_a, &resolved_b));
    }
}
