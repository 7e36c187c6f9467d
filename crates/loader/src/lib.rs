//! Module loader and lifecycle manager for the Hephaestus shell.
//!
//! The loader fetches a module's markup and code on demand, mounts it into an
//! isolated rendering scope, drives its lifecycle, and tears it down when it
//! is replaced or the shell shuts down. One loader instance serves every
//! module; nothing here is ambient or global.
//!
//! # Guards
//!
//! `load_component` applies three guards in order: coalescing onto an
//! in-flight load for the same id, a debounce window against reload storms
//! (500 ms by default), and returning an already-active instance unchanged.
//!
//! # Collaborators
//!
//! - [`ModuleSource`] - fetches markup, scripts, and styles
//! - [`ScriptHost`] - executes module code in host-global scope
//! - [`ModuleLifecycle`] - per-module init/cleanup capability, registered by
//!   id; replaces the legacy name-based global dispatch
//!
//! Load outcomes are observable on a broadcast channel of [`LoaderEvent`]s.

// dev-dependencies exercised by the integration suite only
#[cfg(test)]
use hephaestus_state as _;
#[cfg(test)]
use serde_json as _;

pub mod container;
pub mod error;
pub mod events;
pub mod isolation;
pub mod lifecycle;
pub mod loader;
pub mod script;
pub mod source;

pub use container::{Container, PanelContent};
pub use error::{FetchError, LoadError, ScriptError};
pub use events::LoaderEvent;
pub use isolation::{IsolationManager, IsolationScope};
pub use lifecycle::{CleanupHook, InitDispatch, LifecycleState, ModuleContext, ModuleHandle, ModuleLifecycle};
pub use loader::{LoaderConfig, ModuleLoader};
pub use script::{NullScriptHost, ScriptHost};
pub use source::ModuleSource;
