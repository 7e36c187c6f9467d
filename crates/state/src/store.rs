//! The namespaced store, its handles, and effect evaluation.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::persist::PersistenceAdapter;

/// Options for [`StateStore::connect`].
#[derive(Debug, Default, Clone)]
pub struct ConnectOptions {
	/// Persist the namespace across sessions.
	pub persist: bool,
	/// Keys never written to (or hydrated from) the persistence adapter.
	pub excluded_keys: Vec<String>,
}

/// Read-only view of a namespace's state at one point in time.
#[derive(Debug, Clone, Default)]
pub struct StateSnapshot(Map<String, Value>);

impl StateSnapshot {
	/// Returns the value for `key`, if present.
	pub fn get(&self, key: &str) -> Option<&Value> {
		self.0.get(key)
	}

	/// Deserializes the value for `key` into `T`.
	pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
		self.0.get(key).and_then(|v| serde_json::from_value(v.clone()).ok())
	}

	/// Returns the number of keys.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns true when the namespace holds no keys.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

struct EffectEntry {
	deps: Vec<String>,
	run: Arc<dyn Fn(&StateSnapshot) + Send + Sync>,
}

struct NamespaceInner {
	state: Map<String, Value>,
	effects: Vec<EffectEntry>,
	persist: bool,
	excluded_keys: Vec<String>,
}

struct NamespaceShared {
	name: String,
	cell: Mutex<NamespaceInner>,
}

/// Handle to one module's namespace. Cloneable; all clones share state.
///
/// The namespace lock is released before effects run, so an effect may call
/// `set` re-entrantly (the nested call evaluates its own effects to
/// completion first, like the single-threaded original).
#[derive(Clone)]
pub struct NamespaceHandle {
	shared: Arc<NamespaceShared>,
	adapter: Arc<dyn PersistenceAdapter>,
}

impl NamespaceHandle {
	/// Returns the namespace name.
	pub fn name(&self) -> &str {
		&self.shared.name
	}

	/// Returns the current value for `key`.
	pub fn get(&self, key: &str) -> Option<Value> {
		self.shared.cell.lock().state.get(key).cloned()
	}

	/// Deserializes the current value for `key` into `T`.
	pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
		self.get(key).and_then(|v| serde_json::from_value(v).ok())
	}

	/// Returns a snapshot of the full namespace state.
	pub fn get_all(&self) -> StateSnapshot {
		StateSnapshot(self.shared.cell.lock().state.clone())
	}

	/// Sets a single key.
	pub fn set(&self, key: &str, value: impl Into<Value>) {
		self.apply(vec![(key.to_string(), value.into())]);
	}

	/// Merges an object of changes in one call.
	///
	/// Effects whose dependencies intersect the changed keys run at most once
	/// for the whole call. Non-object values are rejected with a warning.
	pub fn set_many(&self, partial: Value) {
		let Value::Object(entries) = partial else {
			tracing::warn!(namespace = %self.shared.name, "set_many expects an object, ignoring");
			return;
		};
		self.apply(entries.into_iter().collect());
	}

	/// Subscribes `f` to run whenever any key in `deps` changes value.
	///
	/// With `run_immediately`, `f` is invoked once synchronously with the
	/// current state before this returns.
	pub fn register_effect(
		&self,
		deps: &[&str],
		f: impl Fn(&StateSnapshot) + Send + Sync + 'static,
		run_immediately: bool,
	) {
		let run: Arc<dyn Fn(&StateSnapshot) + Send + Sync> = Arc::new(f);
		let snapshot = {
			let mut inner = self.shared.cell.lock();
			inner.effects.push(EffectEntry {
				deps: deps.iter().map(|d| d.to_string()).collect(),
				run: Arc::clone(&run),
			});
			run_immediately.then(|| StateSnapshot(inner.state.clone()))
		};
		if let Some(snapshot) = snapshot {
			run(&snapshot);
		}
	}

	fn apply(&self, entries: Vec<(String, Value)>) {
		let (snapshot, triggered) = {
			let mut inner = self.shared.cell.lock();
			let mut changed: Vec<String> = Vec::new();
			for (key, value) in entries {
				if inner.state.get(&key) != Some(&value) {
					changed.push(key.clone());
				}
				inner.state.insert(key, value);
			}
			let triggered: Vec<_> = inner
				.effects
				.iter()
				.filter(|e| e.deps.iter().any(|d| changed.contains(d)))
				.map(|e| Arc::clone(&e.run))
				.collect();
			(StateSnapshot(inner.state.clone()), triggered)
		};

		for run in &triggered {
			run(&snapshot);
		}

		self.persist_current();
	}

	// Serializes the live state (minus excluded keys) after effects have run,
	// so writes from nested sets are not clobbered by a stale payload.
	fn persist_current(&self) {
		let payload = {
			let inner = self.shared.cell.lock();
			if !inner.persist {
				return;
			}
			let filtered: Map<String, Value> = inner
				.state
				.iter()
				.filter(|(k, _)| !inner.excluded_keys.contains(k))
				.map(|(k, v)| (k.clone(), v.clone()))
				.collect();
			Value::Object(filtered).to_string()
		};
		let key = record_key(&self.shared.name);
		if let Err(e) = self.adapter.store(&key, &payload) {
			tracing::warn!(namespace = %self.shared.name, error = %e, "state persistence write failed");
		}
	}
}

struct StoreInner {
	namespaces: Mutex<FxHashMap<String, Arc<NamespaceShared>>>,
	adapter: Arc<dyn PersistenceAdapter>,
}

/// The store: owns every namespace and the shared persistence adapter.
#[derive(Clone)]
pub struct StateStore {
	inner: Arc<StoreInner>,
}

impl StateStore {
	/// Creates a store backed by `adapter`.
	pub fn new(adapter: Arc<dyn PersistenceAdapter>) -> Self {
		Self {
			inner: Arc::new(StoreInner {
				namespaces: Mutex::new(FxHashMap::default()),
				adapter,
			}),
		}
	}

	/// Creates the namespace if absent and returns a handle to it.
	///
	/// A fresh namespace starts from `initial` (an object), hydrated from the
	/// persisted record when `options.persist` is set - excluded keys are
	/// never hydrated, and missing or unparseable records are treated as
	/// absent. Reconnecting an existing namespace returns the live handle
	/// unchanged.
	pub fn connect(&self, namespace: &str, initial: Value, options: ConnectOptions) -> NamespaceHandle {
		let mut namespaces = self.inner.namespaces.lock();
		if let Some(shared) = namespaces.get(namespace) {
			tracing::debug!(namespace, "reconnecting existing namespace");
			return NamespaceHandle {
				shared: Arc::clone(shared),
				adapter: Arc::clone(&self.inner.adapter),
			};
		}

		let mut state = match initial {
			Value::Object(map) => map,
			_ => {
				tracing::warn!(namespace, "initial state is not an object, starting empty");
				Map::new()
			}
		};
		if options.persist {
			self.hydrate(namespace, &mut state, &options.excluded_keys);
		}

		let shared = Arc::new(NamespaceShared {
			name: namespace.to_string(),
			cell: Mutex::new(NamespaceInner {
				state,
				effects: Vec::new(),
				persist: options.persist,
				excluded_keys: options.excluded_keys,
			}),
		});
		namespaces.insert(namespace.to_string(), Arc::clone(&shared));
		NamespaceHandle {
			shared,
			adapter: Arc::clone(&self.inner.adapter),
		}
	}

	/// Returns a handle to an already-connected namespace.
	pub fn namespace(&self, namespace: &str) -> Option<NamespaceHandle> {
		self.inner.namespaces.lock().get(namespace).map(|shared| NamespaceHandle {
			shared: Arc::clone(shared),
			adapter: Arc::clone(&self.inner.adapter),
		})
	}

	fn hydrate(&self, namespace: &str, state: &mut Map<String, Value>, excluded: &[String]) {
		let key = record_key(namespace);
		let body = match self.inner.adapter.load(&key) {
			Ok(Some(body)) => body,
			Ok(None) => return,
			Err(e) => {
				tracing::warn!(namespace, error = %e, "state persistence read failed");
				return;
			}
		};
		match serde_json::from_str::<Value>(&body) {
			Ok(Value::Object(persisted)) => {
				for (k, v) in persisted {
					if !excluded.contains(&k) {
						state.insert(k, v);
					}
				}
			}
			_ => tracing::warn!(namespace, "persisted record unparseable, treated as absent"),
		}
	}
}

fn record_key(namespace: &str) -> String {
	format!("{namespace}_state")
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicUsize, Ordering};

	use pretty_assertions::assert_eq;
	use serde_json::json;

	use super::*;
	use crate::persist::{MemoryAdapter, PersistError};

	fn store_with(adapter: Arc<MemoryAdapter>) -> StateStore {
		StateStore::new(adapter)
	}

	#[test]
	fn hydration_merges_persisted_over_initial() {
		let adapter = Arc::new(MemoryAdapter::new());
		adapter.seed("ns_state", r#"{"x":7}"#);
		let store = store_with(Arc::clone(&adapter));

		let ns = store.connect(
			"ns",
			json!({"x": 1, "z": 0}),
			ConnectOptions {
				persist: true,
				excluded_keys: vec![],
			},
		);
		assert_eq!(ns.get("x"), Some(json!(7)));
		assert_eq!(ns.get("z"), Some(json!(0)));
	}

	#[test]
	fn hydration_skips_excluded_keys() {
		let adapter = Arc::new(MemoryAdapter::new());
		adapter.seed("ns_state", r#"{"x":7,"y":9}"#);
		let store = store_with(Arc::clone(&adapter));

		let ns = store.connect(
			"ns",
			json!({"x": 1, "y": 2}),
			ConnectOptions {
				persist: true,
				excluded_keys: vec!["y".to_string()],
			},
		);
		assert_eq!(ns.get("x"), Some(json!(7)));
		assert_eq!(ns.get("y"), Some(json!(2)));
	}

	#[test]
	fn unparseable_persisted_record_is_treated_as_absent() {
		let adapter = Arc::new(MemoryAdapter::new());
		adapter.seed("ns_state", "not json at all {");
		let store = store_with(Arc::clone(&adapter));

		let ns = store.connect(
			"ns",
			json!({"x": 1}),
			ConnectOptions {
				persist: true,
				excluded_keys: vec![],
			},
		);
		assert_eq!(ns.get("x"), Some(json!(1)));
	}

	#[test]
	fn persisted_record_omits_excluded_keys() {
		let adapter = Arc::new(MemoryAdapter::new());
		let store = store_with(Arc::clone(&adapter));

		let ns = store.connect(
			"ns",
			json!({"x": 1, "y": 2}),
			ConnectOptions {
				persist: true,
				excluded_keys: vec!["y".to_string()],
			},
		);
		ns.set_many(json!({"x": 5, "y": 9}));

		let record: Value = serde_json::from_str(&adapter.load("ns_state").unwrap().unwrap()).unwrap();
		assert_eq!(record, json!({"x": 5}));
		// the live namespace still holds the excluded key
		assert_eq!(ns.get("y"), Some(json!(9)));
	}

	#[test]
	fn unpersisted_namespace_never_touches_the_adapter() {
		let adapter = Arc::new(MemoryAdapter::new());
		let store = store_with(Arc::clone(&adapter));

		let ns = store.connect("ns", json!({"x": 1}), ConnectOptions::default());
		ns.set("x", 5);
		assert!(adapter.load("ns_state").unwrap().is_none());
	}

	#[test]
	fn effect_runs_once_per_set_call() {
		let store = store_with(Arc::new(MemoryAdapter::new()));
		let ns = store.connect("ns", json!({"a": 0, "b": 0}), ConnectOptions::default());

		let calls = Arc::new(AtomicUsize::new(0));
		let seen = Arc::clone(&calls);
		ns.register_effect(
			&["a", "b"],
			move |_| {
				seen.fetch_add(1, Ordering::SeqCst);
			},
			false,
		);

		ns.set_many(json!({"a": 1, "b": 2}));
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn effect_skips_unchanged_values() {
		let store = store_with(Arc::new(MemoryAdapter::new()));
		let ns = store.connect("ns", json!({"a": 1}), ConnectOptions::default());

		let calls = Arc::new(AtomicUsize::new(0));
		let seen = Arc::clone(&calls);
		ns.register_effect(
			&["a"],
			move |_| {
				seen.fetch_add(1, Ordering::SeqCst);
			},
			false,
		);

		ns.set("a", 1);
		assert_eq!(calls.load(Ordering::SeqCst), 0);
		ns.set("a", 2);
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn effects_run_in_registration_order_with_post_mutation_state() {
		let store = store_with(Arc::new(MemoryAdapter::new()));
		let ns = store.connect("ns", json!({"a": 0, "b": 0}), ConnectOptions::default());

		let order = Arc::new(Mutex::new(Vec::new()));
		let first = Arc::clone(&order);
		ns.register_effect(
			&["a"],
			move |state| {
				// the full mutation is applied before any effect runs
				assert_eq!(state.get("b"), Some(&json!(2)));
				first.lock().push("first");
			},
			false,
		);
		let second = Arc::clone(&order);
		ns.register_effect(
			&["b"],
			move |_| {
				second.lock().push("second");
			},
			false,
		);

		ns.set_many(json!({"a": 1, "b": 2}));
		assert_eq!(*order.lock(), vec!["first", "second"]);
	}

	#[test]
	fn run_immediately_invokes_with_current_state() {
		let store = store_with(Arc::new(MemoryAdapter::new()));
		let ns = store.connect("ns", json!({"a": 3}), ConnectOptions::default());

		let calls = Arc::new(AtomicUsize::new(0));
		let seen = Arc::clone(&calls);
		ns.register_effect(
			&["a"],
			move |state| {
				assert_eq!(state.get("a"), Some(&json!(3)));
				seen.fetch_add(1, Ordering::SeqCst);
			},
			true,
		);
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn effect_may_set_re_entrantly() {
		let adapter = Arc::new(MemoryAdapter::new());
		let store = store_with(Arc::clone(&adapter));
		let ns = store.connect(
			"ns",
			json!({"a": 0, "b": 0}),
			ConnectOptions {
				persist: true,
				excluded_keys: vec![],
			},
		);

		let inner = ns.clone();
		ns.register_effect(
			&["a"],
			move |state| {
				if state.get("b") != Some(&json!(2)) {
					inner.set("b", 2);
				}
			},
			false,
		);

		ns.set("a", 1);
		assert_eq!(ns.get("b"), Some(json!(2)));

		// the outer persist ran after the nested set, so the record holds both
		let record: Value = serde_json::from_str(&adapter.load("ns_state").unwrap().unwrap()).unwrap();
		assert_eq!(record, json!({"a": 1, "b": 2}));
	}

	#[test]
	fn reconnect_returns_the_live_namespace() {
		let store = store_with(Arc::new(MemoryAdapter::new()));
		let first = store.connect("ns", json!({"a": 1}), ConnectOptions::default());
		first.set("a", 42);

		let second = store.connect("ns", json!({"a": 1}), ConnectOptions::default());
		assert_eq!(second.get("a"), Some(json!(42)));
	}

	struct FailingAdapter;

	impl PersistenceAdapter for FailingAdapter {
		fn load(&self, _key: &str) -> Result<Option<String>, PersistError> {
			Err(PersistError::Backend("storage offline".into()))
		}

		fn store(&self, _key: &str, _value: &str) -> Result<(), PersistError> {
			Err(PersistError::Backend("storage offline".into()))
		}

		fn remove(&self, _key: &str) -> Result<(), PersistError> {
			Err(PersistError::Backend("storage offline".into()))
		}
	}

	#[test]
	fn adapter_failures_are_fail_soft() {
		let store = StateStore::new(Arc::new(FailingAdapter));
		let ns = store.connect(
			"ns",
			json!({"x": 1}),
			ConnectOptions {
				persist: true,
				excluded_keys: vec![],
			},
		);
		ns.set("x", 5);
		assert_eq!(ns.get("x"), Some(json!(5)));
	}
}
