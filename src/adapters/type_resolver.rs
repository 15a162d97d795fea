//! In-process `TypeResolver`: a registry of zero-argument factory
//! closures keyed by qualified handler name, populated at startup by
//! whatever composition root wires up the engine.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::domain::models::{Handler, HandlerHooks};
use crate::domain::ports::TypeResolver;

type Factory = Box<dyn Fn() -> (Box<dyn Handler>, HandlerHooks) + Send + Sync>;

/// A `TypeResolver` backed by an in-memory map of factories, registered
/// under `"{namespace}.{entrypoint}"` keys.
#[derive(Default)]
pub struct InProcessTypeResolver {
    factories: RwLock<HashMap<String, Factory>>,
}

impl InProcessTypeResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `qualified_name`. Re-registering the same
    /// name replaces the previous factory.
    pub fn register<F>(&self, qualified_name: impl Into<String>, factory: F)
    where
        F: Fn() -> (Box<dyn Handler>, HandlerHooks) + Send + Sync + 'static,
    {
        self.factories
            .write()
            .expect("type resolver registry lock poisoned")
            .insert(qualified_name.into(), Box::new(factory));
    }
}

impl TypeResolver for InProcessTypeResolver {
    fn find_type_by_name(&self, qualified_name: &str) -> Option<(Box<dyn Handler>, HandlerHooks)> {
        let factories = self.factories.read().expect("type resolver registry lock poisoned");
        let factory = factories.get(qualified_name)?;
        Some(factory())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct EchoHandler;

    #[async_trait]
    impl Handler for EchoHandler {
        async fn perform(&self) -> bool {
            true
        }
    }

    #[test]
    fn registered_factory_is_found_by_qualified_name() {
        let resolver = InProcessTypeResolver::new();
        resolver.register("demo.echo", || (Box::new(EchoHandler) as Box<dyn Handler>, HandlerHooks::default()));

        assert!(resolver.find_type_by_name("demo.echo").is_some());
        assert!(resolver.find_type_by_name("demo.missing").is_none());
    }

    #[test]
    fn re_registering_a_name_replaces_the_factory() {
        let resolver = InProcessTypeResolver::new();
        resolver.register("demo.echo", || (Box::new(EchoHandler) as Box<dyn Handler>, HandlerHooks::default()));
        resolver.register("demo.echo", || (Box::new(EchoHandler) as Box<dyn Handler>, HandlerHooks::default()));

        assert!(resolver.find_type_by_name("demo.echo").is_some());
    }
}
