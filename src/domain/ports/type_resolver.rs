//! The type resolver port.
//!
//! Rust has no runtime reflection, so "find a type by qualified name and
//! construct it with no arguments" is expressed as a registry of
//! zero-argument factory closures keyed by `"{namespace}.{entrypoint}"`.

use crate::domain::models::{Handler, HandlerHooks};

/// Maps a qualified handler name to a freshly constructed handler plus
/// its declared hook bundle. Purely functional from the engine's
/// viewpoint: every call may construct a new instance; caching of the
/// *resolved* handler happens one layer up in the `HandlerRegistry`.
pub trait TypeResolver: Send + Sync {
    /// Construct a handler for `qualified_name`, or `None` if no factory
    /// is registered under that name.
    fn find_type_by_name(&self, qualified_name: &str) -> Option<(Box<dyn Handler>, HandlerHooks)>;
}
