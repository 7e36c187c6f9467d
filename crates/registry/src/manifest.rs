//! Registry manifest fetching and parsing.

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde::Deserialize;

use crate::descriptor::ComponentDescriptor;
use crate::error::RegistryError;

/// Async collaborator producing the raw manifest body.
///
/// The transport is opaque here; the host shell typically serves the manifest
/// as a static JSON resource.
#[async_trait]
pub trait ManifestSource: Send + Sync {
	/// Fetches the manifest body. Errors are reported as display strings.
	async fn fetch_manifest(&self) -> Result<String, String>;
}

/// Wire shape of one manifest entry (camelCase, see the manifest format docs).
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestEntry {
	id: String,
	#[serde(default)]
	name: Option<String>,
	component_path: String,
	#[serde(default)]
	uses_shadow_dom: bool,
	#[serde(default)]
	scripts: Vec<String>,
	#[serde(default)]
	styles: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Manifest {
	components: Vec<ManifestEntry>,
}

/// Read-only lookup over the parsed manifest, keyed by module id.
#[derive(Debug, Default, Clone)]
pub struct ComponentRegistry {
	by_id: FxHashMap<String, ComponentDescriptor>,
}

impl ComponentRegistry {
	/// Parses a manifest body into a registry.
	///
	/// Duplicate ids are resolved first-entry-wins and logged, matching
	/// lookup-by-first-match over the manifest array.
	pub fn from_json(body: &str) -> Result<Self, RegistryError> {
		let manifest: Manifest = serde_json::from_str(body)?;
		let mut by_id = FxHashMap::default();
		for entry in manifest.components {
			let descriptor = ComponentDescriptor {
				name: entry.name.unwrap_or_else(|| entry.id.clone()),
				markup_path: entry.component_path,
				script_paths: entry.scripts,
				style_paths: entry.styles,
				uses_isolated_scope: entry.uses_shadow_dom,
				id: entry.id,
			};
			if by_id.contains_key(&descriptor.id) {
				tracing::warn!(id = %descriptor.id, "duplicate manifest entry ignored, keeping the first");
				continue;
			}
			by_id.insert(descriptor.id.clone(), descriptor);
		}
		Ok(Self { by_id })
	}

	/// Returns the descriptor for `id`, if the manifest declared one.
	pub fn lookup(&self, id: &str) -> Option<&ComponentDescriptor> {
		self.by_id.get(id)
	}

	/// Returns the declared descriptor or the conventional fallback.
	pub fn descriptor_or_conventional(&self, id: &str) -> ComponentDescriptor {
		self.lookup(id).cloned().unwrap_or_else(|| ComponentDescriptor::conventional(id))
	}

	/// Returns the number of declared modules.
	pub fn len(&self) -> usize {
		self.by_id.len()
	}

	/// Returns true when the manifest declared no modules.
	pub fn is_empty(&self) -> bool {
		self.by_id.is_empty()
	}
}

/// Fetches and parses the registry manifest once at startup.
///
/// Failure is non-fatal: the caller logs it and keeps an empty registry so
/// every lookup falls back to conventional paths. No automatic retry.
pub async fn load_registry(source: &dyn ManifestSource) -> Result<ComponentRegistry, RegistryError> {
	let body = source.fetch_manifest().await.map_err(RegistryError::Fetch)?;
	let registry = ComponentRegistry::from_json(&body)?;
	tracing::info!(components = registry.len(), "registry manifest loaded");
	Ok(registry)
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	const MANIFEST: &str = r#"{
		"components": [
			{
				"id": "engram",
				"name": "Engram Memory",
				"componentPath": "components/engram/engram-component.html",
				"usesShadowDom": true,
				"scripts": ["scripts/engram/engram-component.js"],
				"styles": ["styles/engram/engram-component.css"]
			},
			{
				"id": "hermes",
				"componentPath": "components/hermes/hermes-component.html"
			}
		]
	}"#;

	struct StaticSource(&'static str);

	#[async_trait]
	impl ManifestSource for StaticSource {
		async fn fetch_manifest(&self) -> Result<String, String> {
			Ok(self.0.to_string())
		}
	}

	struct FailingSource;

	#[async_trait]
	impl ManifestSource for FailingSource {
		async fn fetch_manifest(&self) -> Result<String, String> {
			Err("connection refused".to_string())
		}
	}

	#[test]
	fn parses_manifest_entries() {
		let registry = ComponentRegistry::from_json(MANIFEST).unwrap();
		let engram = registry.lookup("engram").unwrap();
		assert_eq!(engram.name, "Engram Memory");
		assert_eq!(engram.markup_path, "components/engram/engram-component.html");
		assert_eq!(engram.script_paths, vec!["scripts/engram/engram-component.js".to_string()]);
		assert!(engram.uses_isolated_scope);
	}

	#[test]
	fn optional_fields_default() {
		let registry = ComponentRegistry::from_json(MANIFEST).unwrap();
		let hermes = registry.lookup("hermes").unwrap();
		assert_eq!(hermes.name, "hermes");
		assert!(hermes.script_paths.is_empty());
		assert!(!hermes.uses_isolated_scope);
	}

	#[test]
	fn unknown_id_falls_back_to_conventional_paths() {
		let registry = ComponentRegistry::from_json(MANIFEST).unwrap();
		assert!(registry.lookup("athena").is_none());

		let athena = registry.descriptor_or_conventional("athena");
		assert_eq!(athena.markup_path, "components/athena/athena-component.html");
		assert_eq!(athena.probe_script_path(), "scripts/athena/athena-component.js");
		assert!(!athena.uses_isolated_scope);
	}

	#[test]
	fn duplicate_ids_keep_the_first_entry() {
		let manifest = r#"{
			"components": [
				{"id": "engram", "componentPath": "components/engram/engram-component.html"},
				{"id": "engram", "componentPath": "override/engram.html"}
			]
		}"#;
		let registry = ComponentRegistry::from_json(manifest).unwrap();
		assert_eq!(registry.len(), 1);
		assert_eq!(
			registry.lookup("engram").unwrap().markup_path,
			"components/engram/engram-component.html"
		);
	}

	#[test]
	fn malformed_manifest_is_a_parse_error() {
		let err = ComponentRegistry::from_json("{\"components\": 7}").unwrap_err();
		assert!(matches!(err, RegistryError::Parse(_)));
	}

	#[tokio::test]
	async fn load_registry_reports_fetch_failure() {
		let err = load_registry(&FailingSource).await.unwrap_err();
		assert!(matches!(err, RegistryError::Fetch(_)));
	}

	#[tokio::test]
	async fn load_registry_parses_fetched_body() {
		let registry = load_registry(&StaticSource(MANIFEST)).await.unwrap();
		assert_eq!(registry.len(), 2);
	}
}
