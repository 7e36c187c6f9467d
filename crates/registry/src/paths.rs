//! Conventional path rules for modules absent from the registry manifest.

/// Markup fragment path: `components/{id}/{id}-component.html`.
pub fn conventional_markup_path(id: &str) -> String {
	format!("components/{id}/{id}-component.html")
}

/// External script path: `scripts/{id}/{id}-component.js`.
pub fn conventional_script_path(id: &str) -> String {
	format!("scripts/{id}/{id}-component.js")
}

/// Stylesheet path: `styles/{id}/{id}-component.css`.
pub fn conventional_style_path(id: &str) -> String {
	format!("styles/{id}/{id}-component.css")
}
