//! Visual containers: the exclusive mount point for one active module.
//!
//! A container carries a generation counter bumped at every accepted load.
//! Loads capture the generation they started under and every later mutation
//! re-checks it, so a fetch that was superseded by a newer load can never
//! clobber the container.

use std::sync::Arc;

use parking_lot::Mutex;

/// Content shown inside a container.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PanelContent {
	/// Nothing mounted.
	#[default]
	Empty,
	/// Transient placeholder while a module loads.
	Loading {
		/// Module id being loaded.
		id: String,
	},
	/// A mounted module.
	Mounted {
		/// Module id.
		id: String,
		/// Scope class from the isolation manager, unique per mount.
		scope_class: String,
		/// Module-specific wrapper class for CSS scoping.
		wrapper_class: String,
		/// The injected markup fragment.
		markup: String,
		/// Stylesheets attached to the scope, in load order.
		styles: Vec<String>,
	},
	/// The error panel. Retains the module id as the retry affordance:
	/// [`ModuleLoader::retry`](crate::loader::ModuleLoader::retry) re-invokes
	/// the load with identical arguments.
	Error {
		/// Module id whose load failed.
		id: String,
		/// Display message.
		message: String,
	},
}

#[derive(Debug, Default)]
struct ContainerInner {
	generation: u64,
	content: PanelContent,
}

/// Handle to one visual container. Cloneable; clones share the slot.
#[derive(Debug, Clone, Default)]
pub struct Container {
	inner: Arc<Mutex<ContainerInner>>,
}

impl Container {
	/// Creates an empty container.
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns true when both handles refer to the same container.
	pub fn same(&self, other: &Container) -> bool {
		Arc::ptr_eq(&self.inner, &other.inner)
	}

	/// Returns true when `generation` is still the latest accepted load.
	pub(crate) fn is_current(&self, generation: u64) -> bool {
		self.inner.lock().generation == generation
	}

	/// Returns a snapshot of the current content.
	pub fn content(&self) -> PanelContent {
		self.inner.lock().content.clone()
	}

	/// Returns the mounted module id, if any.
	pub fn mounted_id(&self) -> Option<String> {
		match &self.inner.lock().content {
			PanelContent::Mounted { id, .. } => Some(id.clone()),
			_ => None,
		}
	}

	/// Returns the module id held by the error panel, if showing.
	pub fn retry_target(&self) -> Option<String> {
		match &self.inner.lock().content {
			PanelContent::Error { id, .. } => Some(id.clone()),
			_ => None,
		}
	}

	/// Bumps the generation, shows the loading placeholder, and returns the
	/// new generation for later re-checks.
	pub(crate) fn begin_load(&self, id: &str) -> u64 {
		let mut inner = self.inner.lock();
		inner.generation += 1;
		inner.content = PanelContent::Loading { id: id.to_string() };
		inner.generation
	}

	/// Injects markup for the load that started under `generation`.
	///
	/// Returns false without mutating anything when a newer load has since
	/// bumped the generation.
	pub(crate) fn try_mount(&self, generation: u64, id: &str, scope_class: &str, markup: &str) -> bool {
		let mut inner = self.inner.lock();
		if inner.generation != generation {
			return false;
		}
		inner.content = PanelContent::Mounted {
			id: id.to_string(),
			scope_class: scope_class.to_string(),
			wrapper_class: format!("{id}-container"),
			markup: markup.to_string(),
			styles: Vec::new(),
		};
		true
	}

	/// Attaches a stylesheet to the mounted module, generation-checked.
	pub(crate) fn attach_style(&self, generation: u64, css: &str) -> bool {
		let mut inner = self.inner.lock();
		if inner.generation != generation {
			return false;
		}
		if let PanelContent::Mounted { styles, .. } = &mut inner.content {
			styles.push(css.to_string());
			true
		} else {
			false
		}
	}

	/// Shows the error panel, generation-checked.
	pub(crate) fn show_error(&self, generation: u64, id: &str, message: &str) -> bool {
		let mut inner = self.inner.lock();
		if inner.generation != generation {
			return false;
		}
		inner.content = PanelContent::Error {
			id: id.to_string(),
			message: message.to_string(),
		};
		true
	}

	/// Clears the container if it currently shows `id`.
	pub(crate) fn clear_if_showing(&self, id: &str) {
		let mut inner = self.inner.lock();
		let showing = match &inner.content {
			PanelContent::Mounted { id: shown, .. } => shown == id,
			PanelContent::Loading { id: shown } => shown == id,
			PanelContent::Error { id: shown, .. } => shown == id,
			PanelContent::Empty => false,
		};
		if showing {
			inner.content = PanelContent::Empty;
		}
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn stale_generation_cannot_mutate() {
		let container = Container::new();
		let old = container.begin_load("a");
		let new = container.begin_load("b");
		assert!(old < new);

		assert!(!container.try_mount(old, "a", "a-scope-1", "<div/>"));
		assert_eq!(container.content(), PanelContent::Loading { id: "b".to_string() });

		assert!(container.try_mount(new, "b", "b-scope-2", "<div/>"));
		assert!(!container.show_error(old, "a", "late failure"));
		assert_eq!(container.mounted_id(), Some("b".to_string()));
	}

	#[test]
	fn error_panel_keeps_the_retry_target() {
		let container = Container::new();
		let generation = container.begin_load("bad");
		assert!(container.show_error(generation, "bad", "boom"));
		assert_eq!(container.retry_target(), Some("bad".to_string()));
	}

	#[test]
	fn clear_only_affects_the_named_module() {
		let container = Container::new();
		let generation = container.begin_load("a");
		assert!(container.try_mount(generation, "a", "a-scope-1", "<div/>"));

		container.clear_if_showing("b");
		assert_eq!(container.mounted_id(), Some("a".to_string()));
		container.clear_if_showing("a");
		assert_eq!(container.content(), PanelContent::Empty);
	}
}
