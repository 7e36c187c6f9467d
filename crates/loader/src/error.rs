use thiserror::Error;

/// Errors raised by a [`ModuleSource`](crate::source::ModuleSource) fetch.
#[derive(Debug, Error)]
pub enum FetchError {
	/// The resource responded with a non-success status.
	#[error("status {0}")]
	Status(u16),

	/// The transport itself failed.
	#[error("transport error: {0}")]
	Transport(String),
}

/// Errors local to one module panel during a load.
///
/// None of these propagate past `load_component`: they are converted into the
/// error-panel contract and a `None` return.
#[derive(Debug, Error)]
pub enum LoadError {
	/// The markup fragment could not be fetched.
	#[error("failed to fetch markup from {path}: {source}")]
	MarkupFetch {
		/// Path the fetch was issued against.
		path: String,
		#[source]
		source: FetchError,
	},

	/// The markup fragment body was empty after trimming.
	#[error("markup from {path} is empty")]
	EmptyMarkup {
		/// Path the fetch was issued against.
		path: String,
	},

	/// The module's registered lifecycle failed to initialize.
	#[error("module init failed: {0}")]
	Init(String),
}

/// Error from a [`ScriptHost`](crate::script::ScriptHost) execution.
///
/// Non-fatal: the module stays mounted without the failing script.
#[derive(Debug, Error)]
#[error("script execution failed: {0}")]
pub struct ScriptError(pub String);
