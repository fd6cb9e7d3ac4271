//! Minimal `{{ key }}` template rendering for managed files

use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Banner written at the top of every file this tool manages
pub const MANAGED_BANNER: &str =
    "# THIS FILE IS MANAGED BY OPENVPN-PROVISION - LOCAL CHANGES WILL BE OVERWRITTEN";

/// Key that always resolves to [`MANAGED_BANNER`]
pub const BANNER_KEY: &str = "managed_banner";

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_.-]*)\s*\}\}").expect("placeholder regex is valid")
});

/// Render `template`, replacing each `{{ key }}` with its option value
///
/// Returns the list of unknown keys as the error.
pub fn render(template: &str, options: &BTreeMap<String, String>) -> Result<String, Vec<String>> {
    let mut missing = Vec::new();

    let rendered = PLACEHOLDER.replace_all(template, |caps: &Captures| {
        let key = &caps[1];
        match options.get(key) {
            Some(value) => value.clone(),
            None if key == BANNER_KEY => MANAGED_BANNER.to_string(),
            None => {
                if !missing.iter().any(|m| m == key) {
                    missing.push(key.to_string());
                }
                String::new()
            }
        }
    });

    if missing.is_empty() {
        Ok(rendered.into_owned())
    } else {
        Err(missing)
    }
}
