//! Isolation scopes: exclusive rendering areas preventing id and style
//! collisions between modules.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

/// Handle to one allocated rendering scope.
///
/// The scope class is process-unique, so two simultaneously-active modules
/// can never share one. Consumed by [`IsolationManager::release`].
#[derive(Debug)]
pub struct IsolationScope {
	id: String,
	scope_class: String,
}

impl IsolationScope {
	/// Returns the owning module id.
	pub fn id(&self) -> &str {
		&self.id
	}

	/// Returns the unique scope class tagged onto the mounted markup.
	pub fn scope_class(&self) -> &str {
		&self.scope_class
	}
}

/// Allocates and releases rendering scopes.
#[derive(Debug, Default)]
pub struct IsolationManager {
	next: AtomicU64,
	// scope_class -> module id, for the currently-live scopes
	active: Mutex<FxHashMap<String, String>>,
}

impl IsolationManager {
	/// Creates a manager with no live scopes.
	pub fn new() -> Self {
		Self::default()
	}

	/// Allocates a fresh scope for `id`.
	pub fn allocate(&self, id: &str) -> IsolationScope {
		let n = self.next.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
		let scope_class = format!("{id}-scope-{n}");
		self.active.lock().insert(scope_class.clone(), id.to_string());
		tracing::debug!(id, scope = %scope_class, "isolation scope allocated");
		IsolationScope {
			id: id.to_string(),
			scope_class,
		}
	}

	/// Releases a scope, detaching everything rooted in it.
	///
	/// Taking the scope by value makes double-release unrepresentable.
	pub fn release(&self, scope: IsolationScope) {
		self.active.lock().remove(&scope.scope_class);
		tracing::debug!(id = %scope.id, scope = %scope.scope_class, "isolation scope released");
	}

	/// Returns the number of live scopes.
	pub fn live_scopes(&self) -> usize {
		self.active.lock().len()
	}

	/// Returns true when `scope_class` is currently allocated.
	pub fn is_live(&self, scope_class: &str) -> bool {
		self.active.lock().contains_key(scope_class)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn scopes_are_never_shared() {
		let manager = IsolationManager::new();
		let a = manager.allocate("engram");
		let b = manager.allocate("engram");
		assert_ne!(a.scope_class(), b.scope_class());
		assert_eq!(manager.live_scopes(), 2);
	}

	#[test]
	fn release_retires_the_scope_class() {
		let manager = IsolationManager::new();
		let scope = manager.allocate("hermes");
		let class = scope.scope_class().to_string();
		assert!(manager.is_live(&class));

		manager.release(scope);
		assert!(!manager.is_live(&class));
		assert_eq!(manager.live_scopes(), 0);
	}
}
