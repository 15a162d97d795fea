//! Handler trait and the duck-typed lifecycle hook traits it may compose
//! with, plus the per-type capability record the registry caches.
//!
//! Stable Rust has no runtime method-presence inspection, so the spec's
//! "structural matching" is expressed as a one-time capability-detection
//! step at registration: a factory hands back a `Box<dyn Handler>` plus a
//! `HandlerHooks` bundle of `Option<Box<dyn ...Hook>>`. Every call site
//! downstream is then a plain `if let Some(hook) = &methods.before`.

use async_trait::async_trait;

/// An executable unit of work. Every handler must implement this; the
/// optional lifecycle hooks below are separate traits a concrete type may
/// additionally implement.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Run the unit of work. Returning `false` marks the attempt
    /// unsuccessful without raising an error.
    async fn perform(&self) -> bool;
}

/// Runs before `perform`. Returning `false` skips `perform` for this
/// attempt without counting it as an error.
#[async_trait]
pub trait BeforeHook: Send + Sync {
    async fn before(&self) -> bool;
}

/// Runs after the attempt body, regardless of outcome.
#[async_trait]
pub trait AfterHook: Send + Sync {
    async fn after(&self);
}

/// Runs when `perform` returned `true`.
#[async_trait]
pub trait SuccessHook: Send + Sync {
    async fn success(&self);
}

/// Runs when the attempt is terminally failing, i.e. `job_will_fail()`
/// holds. May fire alongside `SuccessHook` in the same attempt — see
/// DESIGN.md for why this surprising overlap is preserved.
#[async_trait]
pub trait FailureHook: Send + Sync {
    async fn failure(&self);
}

/// Runs when `perform` (or a hook) panicked.
#[async_trait]
pub trait ErrorHook: Send + Sync {
    async fn error(&self, message: &str);
}

/// Runs during shutdown for any handler currently holding a worker slot.
#[async_trait]
pub trait HaltHook: Send + Sync {
    async fn halt(&self, immediate: bool);
}

/// The optional hooks a concrete handler type declared at registration,
/// alongside its `Box<dyn Handler>`. A factory that implements none of
/// these simply leaves every field `None`.
#[derive(Default)]
pub struct HandlerHooks {
    pub before: Option<Box<dyn BeforeHook>>,
    pub after: Option<Box<dyn AfterHook>>,
    pub success: Option<Box<dyn SuccessHook>>,
    pub failure: Option<Box<dyn FailureHook>>,
    pub error: Option<Box<dyn ErrorHook>>,
    pub halt: Option<Box<dyn HaltHook>>,
}

/// Bitset-shaped summary of which hooks a `HandlerHooks` value carries,
/// cached per handler type for the process lifetime so the presence check
/// never has to revisit the `Option`s themselves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandlerCapabilities {
    pub has_before: bool,
    pub has_after: bool,
    pub has_success: bool,
    pub has_failure: bool,
    pub has_error: bool,
    pub has_halt: bool,
}

impl HandlerCapabilities {
    #[must_use]
    pub fn detect(hooks: &HandlerHooks) -> Self {
        Self {
            has_before: hooks.before.is_some(),
            has_after: hooks.after.is_some(),
            has_success: hooks.success.is_some(),
            has_failure: hooks.failure.is_some(),
            has_error: hooks.error.is_some(),
            has_halt: hooks.halt.is_some(),
        }
    }
}

/// A resolved handler plus its cached capability set and hook bundle,
/// the unit the registry stores keyed by `HandlerReference`.
pub struct ResolvedHandler {
    pub handler: Box<dyn Handler>,
    pub hooks: HandlerHooks,
    pub capabilities: HandlerCapabilities,
}

impl ResolvedHandler {
    #[must_use]
    pub fn new(handler: Box<dyn Handler>, hooks: HandlerHooks) -> Self {
        let capabilities = HandlerCapabilities::detect(&hooks);
        Self {
            handler,
            hooks,
            capabilities,
        }
    }
}
