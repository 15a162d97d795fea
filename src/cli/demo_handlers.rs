//! Built-in handlers the CLI registers on startup so `submit`/`run` have
//! something resolvable to exercise without a consumer crate plugging in
//! its own `TypeResolver` factories. Not part of the engine; purely a
//! convenience for manual use and the integration tests.

use async_trait::async_trait;

use crate::adapters::type_resolver::InProcessTypeResolver;
use crate::domain::models::{Handler, HandlerHooks};

/// Always succeeds. The instance payload recorded on a task's
/// `HandlerReference` travels with the row for inspection via `show`;
/// this factory does not thread it into the handler, matching the port's
/// "construct with no arguments" contract.
struct EchoHandler;

#[async_trait]
impl Handler for EchoHandler {
    async fn perform(&self) -> bool {
        tracing::info!("demo.echo performed");
        true
    }
}

/// Always reports failure, useful for exercising retry/backoff manually.
struct FailHandler;

#[async_trait]
impl Handler for FailHandler {
    async fn perform(&self) -> bool {
        tracing::info!("demo.fail performed");
        false
    }
}

/// Register the `demo.echo` and `demo.fail` handlers.
pub fn register(resolver: &InProcessTypeResolver) {
    resolver.register("demo.echo", || {
        (Box::new(EchoHandler) as Box<dyn Handler>, HandlerHooks::default())
    });

    resolver.register("demo.fail", || {
        (Box::new(FailHandler) as Box<dyn Handler>, HandlerHooks::default())
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_both_demo_handlers() {
        let resolver = InProcessTypeResolver::new();
        register(&resolver);

        assert!(resolver.find_type_by_name("demo.echo").is_some());
        assert!(resolver.find_type_by_name("demo.fail").is_some());
        assert!(resolver.find_type_by_name("demo.missing").is_none());
    }
}
