use async_trait::async_trait;

use crate::error::FetchError;

/// Async collaborator serving module resources (markup, scripts, styles).
///
/// The loader appends a cache-defeating query parameter to every fetch; the
/// transport behind this trait is opaque.
#[async_trait]
pub trait ModuleSource: Send + Sync {
	/// Fetches the resource at `path` as UTF-8 text.
	///
	/// `cache_buster` is the value for the `t` query parameter.
	async fn fetch(&self, path: &str, cache_buster: u64) -> Result<String, FetchError>;

	/// Probes whether a resource exists without fetching its body.
	async fn exists(&self, path: &str) -> bool;
}

#[cfg(test)]
pub(crate) mod tests_support {
	use super::*;

	/// Source with no resources at all.
	pub struct EmptySource;

	#[async_trait]
	impl ModuleSource for EmptySource {
		async fn fetch(&self, _path: &str, _cache_buster: u64) -> Result<String, FetchError> {
			Err(FetchError::Status(404))
		}

		async fn exists(&self, _path: &str) -> bool {
			false
		}
	}
}
