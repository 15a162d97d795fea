//! Domain models.
//!
//! Pure domain entities with business logic and validation rules. These
//! models are framework-agnostic and contain no infrastructure concerns.

pub mod handler;
pub mod task;

pub use handler::{
    AfterHook, BeforeHook, ErrorHook, FailureHook, HaltHook, Handler, HandlerCapabilities,
    HandlerHooks, ResolvedHandler, SuccessHook,
};
pub use task::{HandlerReference, ScheduledTask};
