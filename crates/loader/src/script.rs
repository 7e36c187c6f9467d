//! Inline script extraction and the script execution collaborator.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::ScriptError;

/// Executes module code on behalf of the loader.
///
/// Inline blocks run in host-global scope, not the isolated scope; this is a
/// deliberate compatibility rule for modules that install globals.
pub trait ScriptHost: Send + Sync {
	/// Runs one inline code block extracted from fetched markup.
	fn run_inline(&self, module: &str, code: &str) -> Result<(), ScriptError>;

	/// Runs an external module script fetched from `path`.
	fn run_external(&self, module: &str, path: &str, code: &str) -> Result<(), ScriptError>;
}

/// Host with no script engine: every execution is a silent no-op.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullScriptHost;

impl ScriptHost for NullScriptHost {
	fn run_inline(&self, _module: &str, _code: &str) -> Result<(), ScriptError> {
		Ok(())
	}

	fn run_external(&self, _module: &str, _path: &str, _code: &str) -> Result<(), ScriptError> {
		Ok(())
	}
}

static SCRIPT_BLOCK: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"(?is)<script\b([^>]*)>(.*?)</script>").unwrap());

/// Extracts the inline `<script>` bodies from a markup fragment.
///
/// Blocks with a `src` attribute are external references and skipped; blank
/// bodies are dropped. Order follows document order.
pub fn extract_inline_scripts(markup: &str) -> Vec<String> {
	SCRIPT_BLOCK
		.captures_iter(markup)
		.filter(|caps| !caps[1].to_ascii_lowercase().contains("src="))
		.filter_map(|caps| {
			let body = caps[2].trim();
			(!body.is_empty()).then(|| body.to_string())
		})
		.collect()
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;

	use super::*;

	#[test]
	fn extracts_inline_blocks_in_order() {
		let markup = r#"
			<div class="panel"></div>
			<script>first();</script>
			<p>text</p>
			<SCRIPT type="text/javascript">
				second();
			</SCRIPT>
		"#;
		assert_eq!(extract_inline_scripts(markup), vec!["first();".to_string(), "second();".to_string()]);
	}

	#[test]
	fn skips_external_and_blank_blocks() {
		let markup = r#"
			<script src="scripts/engram/engram-component.js"></script>
			<script>   </script>
			<script>init();</script>
		"#;
		assert_eq!(extract_inline_scripts(markup), vec!["init();".to_string()]);
	}

	#[test]
	fn markup_without_scripts_yields_none() {
		assert!(extract_inline_scripts("<div>static panel</div>").is_empty());
	}
}
