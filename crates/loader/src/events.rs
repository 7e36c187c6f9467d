/// Load outcomes broadcast by the loader.
///
/// This channel replaces the legacy implicit "ready" bus: hosts subscribe via
/// [`ModuleLoader::events`](crate::loader::ModuleLoader::events).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoaderEvent {
	/// A module finished mounting and is active.
	Loaded {
		/// Module id.
		id: String,
	},
	/// Generic ready signal for legacy modules with no registered lifecycle.
	///
	/// Suppressed when the fetched markup contained inline scripts (those are
	/// assumed to self-initialize).
	Ready {
		/// Module id.
		id: String,
	},
	/// A load failed; the container shows the error panel.
	Failed {
		/// Module id.
		id: String,
		/// Display string of the failure.
		error: String,
	},
	/// Cleanup completed and the instance record was discarded.
	CleanedUp {
		/// Module id.
		id: String,
	},
}
