//! The module lifecycle capability interface and per-instance state machine.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::container::Container;

/// Lifecycle state of one module instance.
///
/// `Loading -> {Active | Failed}`; `Active -> Inactive` on being superseded,
/// then `Destroyed` once cleanup completes (the record is removed, so
/// `Destroyed` is never observable through the loader). `Failed -> Loading`
/// on retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
	/// Markup/code fetch in progress.
	Loading,
	/// Mounted and owning its container.
	Active,
	/// Superseded; cleanup is about to run.
	Inactive,
	/// The last load attempt failed; the container shows the error panel.
	Failed,
	/// Terminal. Cleanup ran; the instance record is gone.
	Destroyed,
}

/// Instance-level teardown hook, run exactly once during cleanup.
pub type CleanupHook = Box<dyn FnOnce() -> Result<(), String> + Send>;

/// Capability interface a module registers with the loader.
///
/// This replaces the legacy convention of name-based global lookups
/// (`{id}Component.init` / `{id}Cleanup`): the loader invokes whatever was
/// registered for the module id, nothing else.
#[async_trait]
pub trait ModuleLifecycle: Send + Sync {
	/// Called once the module's markup is mounted.
	async fn init(&self, ctx: &ModuleContext) -> Result<(), String>;

	/// Called during cleanup, after instance-level hooks. Optional.
	fn cleanup(&self) -> Result<(), String> {
		Ok(())
	}
}

/// Per-instance context handed to [`ModuleLifecycle::init`].
#[derive(Clone)]
pub struct ModuleContext {
	id: String,
	scope_class: String,
	container: Container,
	hooks: Arc<Mutex<Vec<CleanupHook>>>,
}

impl ModuleContext {
	pub(crate) fn new(id: &str, scope_class: &str, container: Container, hooks: Arc<Mutex<Vec<CleanupHook>>>) -> Self {
		Self {
			id: id.to_string(),
			scope_class: scope_class.to_string(),
			container,
			hooks,
		}
	}

	/// Returns the module id.
	pub fn id(&self) -> &str {
		&self.id
	}

	/// Returns the scope class of this instance's isolation scope.
	pub fn scope_class(&self) -> &str {
		&self.scope_class
	}

	/// Returns the container this instance is mounted in.
	pub fn container(&self) -> &Container {
		&self.container
	}

	/// Registers an instance-level cleanup hook.
	///
	/// Hooks run in registration order when the instance is torn down; a
	/// failing hook is logged and does not block the remaining ones.
	pub fn register_cleanup(&self, hook: impl FnOnce() -> Result<(), String> + Send + 'static) {
		self.hooks.lock().push(Box::new(hook));
	}
}

#[derive(Debug)]
struct HandleInner {
	id: String,
	generation: u64,
	scope_class: String,
	dispatch: InitDispatch,
}

/// Handle to a loaded module instance, returned by `load_component`.
///
/// Equality is instance identity: two handles compare equal only when they
/// refer to the same load.
#[derive(Debug, Clone)]
pub struct ModuleHandle {
	inner: Arc<HandleInner>,
}

impl ModuleHandle {
	pub(crate) fn new(id: &str, generation: u64, scope_class: &str, dispatch: InitDispatch) -> Self {
		Self {
			inner: Arc::new(HandleInner {
				id: id.to_string(),
				generation,
				scope_class: scope_class.to_string(),
				dispatch,
			}),
		}
	}

	/// Returns the module id.
	pub fn id(&self) -> &str {
		&self.inner.id
	}

	/// Returns the container generation this instance mounted under.
	pub fn generation(&self) -> u64 {
		self.inner.generation
	}

	/// Returns the scope class of the instance's isolation scope.
	pub fn scope_class(&self) -> &str {
		&self.inner.scope_class
	}

	/// Returns how the module was initialized.
	pub fn dispatch(&self) -> InitDispatch {
		self.inner.dispatch
	}
}

impl PartialEq for ModuleHandle {
	fn eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.inner, &other.inner)
	}
}

impl Eq for ModuleHandle {}

/// How a freshly-mounted module was initialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitDispatch {
	/// A registered [`ModuleLifecycle`] handled init.
	Lifecycle,
	/// No lifecycle and no inline scripts: the generic ready signal fired.
	ReadySignal,
	/// Inline scripts were present and assumed to self-initialize; the
	/// generic ready signal was suppressed.
	Suppressed,
}
