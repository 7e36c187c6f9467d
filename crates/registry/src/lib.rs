//! Component descriptors and the startup registry for the Hephaestus module runtime.
//!
//! The registry is fetched once at startup from a manifest resource and then
//! shared read-only. A missing or malformed manifest is non-fatal: callers
//! fall back to the conventional path rules in [`paths`].
//!
//! # Core Types
//!
//! - [`ComponentDescriptor`] - Immutable record describing one loadable module
//! - [`ComponentRegistry`] - Id-keyed lookup over parsed descriptors
//! - [`ManifestSource`] - Async collaborator that produces the raw manifest body
//! - [`RegistryError`] - Fetch/parse failures, logged and recoverable

pub mod descriptor;
pub mod error;
pub mod manifest;
pub mod paths;

pub use descriptor::ComponentDescriptor;
pub use error::RegistryError;
pub use manifest::{ComponentRegistry, ManifestSource, load_registry};
pub use paths::{conventional_markup_path, conventional_script_path, conventional_style_path};
