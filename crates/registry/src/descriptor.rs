use crate::paths;

/// Immutable record describing one installable module.
///
/// Sourced from the registry manifest when present; otherwise derived from the
/// conventional path rules via [`ComponentDescriptor::conventional`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentDescriptor {
	/// Unique module id (e.g. `"engram"`).
	pub id: String,
	/// Human-readable name shown by the host shell.
	pub name: String,
	/// Path to the markup fragment.
	pub markup_path: String,
	/// External script paths, in load order. Empty for static modules.
	pub script_paths: Vec<String>,
	/// Stylesheet paths attached to the module's scope. Empty means
	/// conventional-path probing.
	pub style_paths: Vec<String>,
	/// Whether the module declares isolated-scope usage. Defaults to false
	/// for modules absent from the manifest.
	pub uses_isolated_scope: bool,
}

impl ComponentDescriptor {
	/// Builds the fallback descriptor for a module the registry does not know.
	pub fn conventional(id: &str) -> Self {
		Self {
			id: id.to_string(),
			name: id.to_string(),
			markup_path: paths::conventional_markup_path(id),
			script_paths: Vec::new(),
			style_paths: Vec::new(),
			uses_isolated_scope: false,
		}
	}

	/// Returns the external script path to probe when none is declared.
	pub fn probe_script_path(&self) -> String {
		paths::conventional_script_path(&self.id)
	}

	/// Returns the stylesheet path to probe when none is declared.
	pub fn probe_style_path(&self) -> String {
		paths::conventional_style_path(&self.id)
	}
}
