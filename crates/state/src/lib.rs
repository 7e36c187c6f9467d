//! Namespaced reactive state store for Hephaestus modules.
//!
//! Each loaded module owns exactly one [`Namespace`]: a keyed map of
//! [`serde_json::Value`] with dependency-tracked effects and optional
//! persistence across sessions. Namespaces are never shared between modules.
//!
//! # Semantics
//!
//! - A `set` call merges its changes, then runs every effect whose dependency
//!   set intersects the changed keys at most once, in registration order,
//!   against the post-mutation state.
//! - When persistence is enabled the namespace is serialized minus its
//!   excluded keys under the record key `"{namespace}_state"` after every
//!   `set`. Adapter failures are logged and never propagate.
//!
//! [`Namespace`]: store::NamespaceHandle

pub mod persist;
pub mod store;

pub use persist::{JsonFileAdapter, MemoryAdapter, PersistError, PersistenceAdapter};
pub use store::{ConnectOptions, NamespaceHandle, StateSnapshot, StateStore};
