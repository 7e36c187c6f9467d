//! The module loader: guards, load sequencing, and the cleanup protocol.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use hephaestus_registry::{ComponentRegistry, conventional_script_path, conventional_style_path};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::container::Container;
use crate::error::{FetchError, LoadError};
use crate::events::LoaderEvent;
use crate::isolation::{IsolationManager, IsolationScope};
use crate::lifecycle::{CleanupHook, InitDispatch, LifecycleState, ModuleContext, ModuleHandle, ModuleLifecycle};
use crate::script::{self, ScriptHost};
use crate::source::ModuleSource;

/// Tuning knobs for the loader.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
	/// Minimum wall-clock gap between accepted loads of the same id.
	/// Repeat requests inside the window are rejected without I/O.
	pub debounce_window: Duration,
	/// Capacity of the [`LoaderEvent`] broadcast channel.
	pub event_capacity: usize,
}

impl Default for LoaderConfig {
	fn default() -> Self {
		Self {
			debounce_window: Duration::from_millis(500),
			event_capacity: 64,
		}
	}
}

type SharedLoad = Shared<BoxFuture<'static, Option<ModuleHandle>>>;

struct InstanceRecord {
	state: LifecycleState,
	generation: u64,
	container: Container,
	scope: Option<IsolationScope>,
	loaded_at: Option<Instant>,
	handle: Option<ModuleHandle>,
	hooks: Arc<Mutex<Vec<CleanupHook>>>,
}

impl InstanceRecord {
	fn loading(container: Container) -> Self {
		Self {
			state: LifecycleState::Loading,
			generation: 0,
			container,
			scope: None,
			loaded_at: None,
			handle: None,
			hooks: Arc::new(Mutex::new(Vec::new())),
		}
	}
}

#[derive(Default)]
struct LoaderState {
	instances: FxHashMap<String, InstanceRecord>,
	lifecycles: FxHashMap<String, Arc<dyn ModuleLifecycle>>,
	contexts: FxHashMap<String, ModuleContext>,
	inflight: FxHashMap<String, SharedLoad>,
	last_accepted: FxHashMap<String, Instant>,
}

struct LoaderInner {
	registry: ComponentRegistry,
	source: Arc<dyn ModuleSource>,
	scripts: Arc<dyn ScriptHost>,
	config: LoaderConfig,
	isolation: IsolationManager,
	default_container: Container,
	events: broadcast::Sender<LoaderEvent>,
	state: Mutex<LoaderState>,
}

enum LoadStop {
	Superseded,
	Error(String),
}

/// Loads modules on demand and manages their lifecycle.
///
/// Owns the instance registry, the per-module lifecycle registrations, the
/// module-scoped execution contexts, and the isolation manager. All of it is
/// reachable only through this object.
#[derive(Clone)]
pub struct ModuleLoader {
	inner: Arc<LoaderInner>,
}

impl ModuleLoader {
	/// Creates a loader with the default configuration.
	pub fn new(registry: ComponentRegistry, source: Arc<dyn ModuleSource>, scripts: Arc<dyn ScriptHost>) -> Self {
		Self::with_config(registry, source, scripts, LoaderConfig::default())
	}

	/// Creates a loader with an explicit configuration.
	pub fn with_config(
		registry: ComponentRegistry,
		source: Arc<dyn ModuleSource>,
		scripts: Arc<dyn ScriptHost>,
		config: LoaderConfig,
	) -> Self {
		let (events, _) = broadcast::channel(config.event_capacity);
		Self {
			inner: Arc::new(LoaderInner {
				registry,
				source,
				scripts,
				config,
				isolation: IsolationManager::new(),
				default_container: Container::new(),
				events,
				state: Mutex::new(LoaderState::default()),
			}),
		}
	}

	/// Registers the lifecycle capability for a module id.
	///
	/// The registration survives cleanup, so a reloaded module initializes
	/// through the same capability.
	pub fn register_lifecycle(&self, id: &str, lifecycle: Arc<dyn ModuleLifecycle>) {
		self.inner.state.lock().lifecycles.insert(id.to_string(), lifecycle);
	}

	/// Removes the lifecycle registration for a module id.
	pub fn unregister_lifecycle(&self, id: &str) {
		self.inner.state.lock().lifecycles.remove(id);
	}

	/// Subscribes to load outcome events.
	pub fn events(&self) -> broadcast::Receiver<LoaderEvent> {
		self.inner.events.subscribe()
	}

	/// Returns the default host slot used by [`ModuleLoader::load`].
	pub fn default_container(&self) -> Container {
		self.inner.default_container.clone()
	}

	/// Returns the lifecycle state of a module instance, `None` once the
	/// record has been destroyed (or never existed).
	pub fn lifecycle_state(&self, id: &str) -> Option<LifecycleState> {
		self.inner.state.lock().instances.get(id).map(|r| r.state)
	}

	/// Returns the handle of a loaded instance.
	pub fn instance(&self, id: &str) -> Option<ModuleHandle> {
		self.inner.state.lock().instances.get(id).and_then(|r| r.handle.clone())
	}

	/// Returns the isolation manager (scope bookkeeping is observable).
	pub fn isolation(&self) -> &IsolationManager {
		&self.inner.isolation
	}

	/// Loads a module into the default host slot.
	pub async fn load(&self, id: &str) -> Option<ModuleHandle> {
		let container = self.default_container();
		self.load_component(id, &container).await
	}

	/// Loads a module into `container`.
	///
	/// Returns `None` on failure; the container then shows the error panel
	/// with the module id retained as the retry affordance. Nothing thrown by
	/// any load stage escapes this call.
	pub async fn load_component(&self, id: &str, container: &Container) -> Option<ModuleHandle> {
		let load = {
			let mut state = self.inner.state.lock();

			// Single-flight: an in-flight load for this id absorbs the call.
			if let Some(inflight) = state.inflight.get(id) {
				tracing::debug!(id, "coalescing onto in-flight load");
				inflight.clone()
			} else {
				let now = Instant::now();
				// Debounce: reject repeats inside the window without I/O.
				if let Some(last) = state.last_accepted.get(id)
					&& now.duration_since(*last) < self.inner.config.debounce_window
				{
					tracing::debug!(id, "load rejected by debounce window");
					return state.instances.get(id).and_then(|r| r.handle.clone());
				}
				// Already active and loaded: return it unchanged.
				if let Some(record) = state.instances.get(id)
					&& record.state == LifecycleState::Active
					&& let Some(handle) = record.handle.clone()
				{
					tracing::debug!(id, "module already active, returning existing instance");
					return Some(handle);
				}

				state.last_accepted.insert(id.to_string(), now);
				let loader = self.clone();
				let key = id.to_string();
				let id = id.to_string();
				let container = container.clone();
				let load: SharedLoad = async move { loader.run_load(&id, &container).await }.boxed().shared();
				state.inflight.insert(key, load.clone());
				load
			}
		};
		load.await
	}

	/// Re-invokes `load_component` for the module named by the container's
	/// error panel.
	pub async fn retry(&self, container: &Container) -> Option<ModuleHandle> {
		let id = container.retry_target()?;
		self.load_component(&id, container).await
	}

	/// Tears down the instance for `id`.
	///
	/// Runs instance-level hooks (each guarded), then the registered
	/// lifecycle's `cleanup` (guarded), discards the module's execution
	/// context, and releases its isolation scope. No-op when the id has no
	/// instance; calling twice in a row finds nothing the second time.
	pub fn cleanup(&self, id: &str) {
		let (record, lifecycle) = {
			let mut state = self.inner.state.lock();
			let Some(mut record) = state.instances.remove(id) else {
				tracing::debug!(id, "cleanup requested but no instance exists");
				return;
			};
			if record.state == LifecycleState::Active {
				record.state = LifecycleState::Inactive;
			}
			state.contexts.remove(id);
			(record, state.lifecycles.get(id).cloned())
		};

		let hooks: Vec<CleanupHook> = std::mem::take(&mut *record.hooks.lock());
		for hook in hooks {
			if let Err(e) = hook() {
				tracing::error!(id, error = %e, "instance cleanup hook failed");
			}
		}
		if let Some(lifecycle) = lifecycle
			&& let Err(e) = lifecycle.cleanup()
		{
			tracing::error!(id, error = %e, "module lifecycle cleanup failed");
		}
		if let Some(scope) = record.scope {
			self.inner.isolation.release(scope);
		}
		record.container.clear_if_showing(id);
		let _ = self.inner.events.send(LoaderEvent::CleanedUp { id: id.to_string() });
		tracing::debug!(id, "instance destroyed");
	}

	/// Tears down every remaining instance (page-unload path).
	pub fn shutdown(&self) {
		let ids: Vec<String> = self.inner.state.lock().instances.keys().cloned().collect();
		for id in ids {
			self.cleanup(&id);
		}
	}

	async fn run_load(&self, id: &str, container: &Container) -> Option<ModuleHandle> {
		let result = self.try_load(id, container).await;
		self.inner.state.lock().inflight.remove(id);
		match result {
			Ok(handle) => Some(handle),
			Err(LoadStop::Superseded) => {
				tracing::debug!(id, "load superseded by a newer module, abandoned");
				None
			}
			Err(LoadStop::Error(message)) => {
				tracing::debug!(id, error = %message, "load failed, error panel shown");
				None
			}
		}
	}

	async fn try_load(&self, id: &str, container: &Container) -> Result<ModuleHandle, LoadStop> {
		// Deactivate whatever else is active in this container and run its
		// cleanup to completion before the new module touches anything.
		let superseded: Vec<String> = {
			let mut state = self.inner.state.lock();
			state
				.instances
				.iter_mut()
				.filter(|(other, record)| {
					other.as_str() != id && record.state == LifecycleState::Active && record.container.same(container)
				})
				.map(|(other, record)| {
					record.state = LifecycleState::Inactive;
					other.clone()
				})
				.collect()
		};
		for other in superseded {
			tracing::debug!(id = %other, replaced_by = id, "deactivating previous module");
			self.cleanup(&other);
		}

		{
			let mut state = self.inner.state.lock();
			match state.instances.get_mut(id) {
				Some(record) => {
					// Failed -> Loading on retry.
					record.state = LifecycleState::Loading;
					record.container = container.clone();
				}
				None => {
					state.instances.insert(id.to_string(), InstanceRecord::loading(container.clone()));
				}
			}
		}

		let generation = container.begin_load(id);
		let descriptor = self.inner.registry.descriptor_or_conventional(id);
		let buster = cache_buster();

		let markup = match self.inner.source.fetch(&descriptor.markup_path, buster).await {
			Ok(body) => body,
			Err(source) => {
				return Err(self.fail(
					id,
					container,
					generation,
					LoadError::MarkupFetch {
						path: descriptor.markup_path.clone(),
						source,
					},
				));
			}
		};
		if markup.trim().is_empty() {
			return Err(self.fail(
				id,
				container,
				generation,
				LoadError::EmptyMarkup {
					path: descriptor.markup_path.clone(),
				},
			));
		}

		let scope = self.inner.isolation.allocate(id);
		let scope_class = scope.scope_class().to_string();
		let inline_scripts = script::extract_inline_scripts(&markup);

		// Final generation check before the container is mutated: a newer
		// load owns it now if the generations diverged.
		if !container.try_mount(generation, id, &scope_class, &markup) {
			self.inner.isolation.release(scope);
			self.inner.state.lock().instances.remove(id);
			return Err(LoadStop::Superseded);
		}
		{
			let mut state = self.inner.state.lock();
			if let Some(record) = state.instances.get_mut(id) {
				record.generation = generation;
				record.scope = Some(scope);
			} else {
				// Cleaned up from under us mid-load.
				self.inner.isolation.release(scope);
				return Err(LoadStop::Superseded);
			}
		}

		// Inline blocks run once each, in host-global scope.
		for code in &inline_scripts {
			if let Err(e) = self.inner.scripts.run_inline(id, code) {
				tracing::warn!(id, error = %e, "inline script failed");
			}
		}
		self.load_external_scripts(id, &descriptor.script_paths, buster).await;
		self.load_styles(id, container, generation, &descriptor.style_paths, buster).await;

		// The script/style awaits above are a window for a newer load to take
		// the container; a stale load must never become Active.
		if !container.is_current(generation) {
			self.abandon(id);
			return Err(LoadStop::Superseded);
		}

		let lifecycle = self.inner.state.lock().lifecycles.get(id).cloned();
		let dispatch = match &lifecycle {
			Some(_) => InitDispatch::Lifecycle,
			None if inline_scripts.is_empty() => InitDispatch::ReadySignal,
			None => InitDispatch::Suppressed,
		};
		let handle = ModuleHandle::new(id, generation, &scope_class, dispatch);

		{
			let mut state = self.inner.state.lock();
			let Some(record) = state.instances.get_mut(id) else {
				return Err(LoadStop::Superseded);
			};
			record.state = LifecycleState::Active;
			record.loaded_at = Some(Instant::now());
			record.handle = Some(handle.clone());
		}
		let _ = self.inner.events.send(LoaderEvent::Loaded { id: id.to_string() });

		match lifecycle {
			Some(lifecycle) => {
				if !container.is_current(generation) {
					self.abandon(id);
					return Err(LoadStop::Superseded);
				}
				let ctx = {
					let mut state = self.inner.state.lock();
					let Some(record) = state.instances.get(id) else {
						return Err(LoadStop::Superseded);
					};
					let ctx = ModuleContext::new(id, &scope_class, container.clone(), Arc::clone(&record.hooks));
					state.contexts.insert(id.to_string(), ctx.clone());
					ctx
				};
				if let Err(e) = lifecycle.init(&ctx).await {
					return Err(self.fail(id, container, generation, LoadError::Init(e)));
				}
			}
			None if inline_scripts.is_empty() => {
				let _ = self.inner.events.send(LoaderEvent::Ready { id: id.to_string() });
			}
			None => {
				tracing::debug!(id, "inline scripts present, generic ready signal suppressed");
			}
		}

		tracing::info!(id, scope = %scope_class, "module loaded");
		Ok(handle)
	}

	/// Discards the instance record of a superseded load and releases its
	/// scope. The newer load owns the container; nothing else is touched.
	fn abandon(&self, id: &str) {
		let scope = self.inner.state.lock().instances.remove(id).and_then(|record| record.scope);
		if let Some(scope) = scope {
			self.inner.isolation.release(scope);
		}
	}

	/// Loads the module's external scripts: declared paths when the registry
	/// knows them, otherwise the conventional path when the probe finds one.
	async fn load_external_scripts(&self, id: &str, declared: &[String], buster: u64) {
		let paths: Vec<String> = if declared.is_empty() {
			let probe = conventional_script_path(id);
			if self.inner.source.exists(&probe).await {
				vec![probe]
			} else {
				tracing::debug!(id, "no external script found, module may be static");
				Vec::new()
			}
		} else {
			declared.to_vec()
		};
		for path in paths {
			match self.inner.source.fetch(&path, buster).await {
				Ok(code) => {
					if let Err(e) = self.inner.scripts.run_external(id, &path, &code) {
						tracing::warn!(id, path, error = %e, "external script failed, module continues without it");
					}
				}
				Err(e) => {
					tracing::warn!(id, path, error = %e, "script fetch failed, module continues without it");
				}
			}
		}
	}

	/// Loads stylesheets fail-soft: missing or empty styles are skipped.
	async fn load_styles(&self, id: &str, container: &Container, generation: u64, declared: &[String], buster: u64) {
		let paths: Vec<String> = if declared.is_empty() {
			vec![conventional_style_path(id)]
		} else {
			declared.to_vec()
		};
		for path in paths {
			match self.inner.source.fetch(&path, buster).await {
				Ok(css) if !css.trim().is_empty() => {
					container.attach_style(generation, &css);
				}
				Ok(_) => tracing::warn!(id, path, "stylesheet empty, using default styles"),
				Err(e) => tracing::debug!(id, path, error = %e, "no dedicated stylesheet, using default styles"),
			}
		}
	}

	fn fail(&self, id: &str, container: &Container, generation: u64, error: LoadError) -> LoadStop {
		let message = error.to_string();
		tracing::error!(id, error = %message, "module load failed");
		if matches!(&error, LoadError::MarkupFetch { source: FetchError::Status(s), .. } if *s == 404) {
			tracing::debug!(id, "markup resource missing; check the component files and registry paths");
		}
		let scope = {
			let mut state = self.inner.state.lock();
			state.instances.get_mut(id).and_then(|record| {
				record.state = LifecycleState::Failed;
				record.handle = None;
				record.scope.take()
			})
		};
		if let Some(scope) = scope {
			self.inner.isolation.release(scope);
		}
		container.show_error(generation, id, &message);
		let _ = self.inner.events.send(LoaderEvent::Failed {
			id: id.to_string(),
			error: message.clone(),
		});
		LoadStop::Error(message)
	}
}

fn cache_buster() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| d.as_millis() as u64)
		.unwrap_or(0)
}
