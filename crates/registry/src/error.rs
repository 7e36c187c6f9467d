use thiserror::Error;

/// Errors raised while loading or parsing the registry manifest.
///
/// All variants are non-fatal for the host shell: callers log them and fall
/// back to conventional paths.
#[derive(Debug, Error)]
pub enum RegistryError {
	/// The manifest resource could not be fetched.
	#[error("failed to fetch registry manifest: {0}")]
	Fetch(String),

	/// The manifest body was not valid JSON of the expected shape.
	#[error("failed to parse registry manifest: {0}")]
	Parse(#[from] serde_json::Error),
}
