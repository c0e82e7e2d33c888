//! The page-embedded injection payload.
//!
//! The server embeds one JSON block per page at render time:
//!
//! ```html
//! <script id="veneer-payload" type="application/json">
//!   {"variant_data": {...}, "theme_adapter": {"selectors": {...}}}
//! </script>
//! ```
//!
//! Authenticity is the embedder's responsibility — by the time this block
//! is in the page it has already crossed the signed server boundary, so
//! parsing performs no verification. Any deviation from the exact
//! two-part shape is treated as absent data and the page renders
//! unmodified.

use crate::adapter::{FieldKey, RenderStrategy};
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// DOM id of the embedded payload element.
pub const PAYLOAD_ELEMENT_ID: &str = "veneer-payload";

/// One field's variant content: free text or an ordered string list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariantValue {
    Text(String),
    List(Vec<String>),
}

impl VariantValue {
    /// Flatten to text; lists join with a comma, matching how badge
    /// strings read when a theme renders them inline.
    pub fn as_text(&self) -> String {
        match self {
            VariantValue::Text(t) => t.clone(),
            VariantValue::List(items) => items.join(", "),
        }
    }

    /// View as an ordered list; bare text becomes a single item.
    pub fn as_list(&self) -> Vec<String> {
        match self {
            VariantValue::Text(t) => vec![t.clone()],
            VariantValue::List(items) => items.clone(),
        }
    }
}

/// The resolved selector map travelling with the payload. No fingerprint
/// at this layer — resolution already happened server-side.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PayloadAdapter {
    pub selectors: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fallback_selectors: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub strategies: BTreeMap<String, RenderStrategy>,
}

/// The exact two-part shape the agent accepts. Both parts are required;
/// anything else fails to parse and the agent no-ops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InjectionPayload {
    pub variant_data: BTreeMap<String, VariantValue>,
    pub theme_adapter: PayloadAdapter,
}

impl InjectionPayload {
    /// Rendering strategy for a field: explicit payload override first,
    /// then the canonical default for known keys, then the value shape.
    pub fn strategy_for(&self, key: &str, value: &VariantValue) -> RenderStrategy {
        if let Some(s) = self.theme_adapter.strategies.get(key) {
            return *s;
        }
        if let Some(known) = FieldKey::parse(key) {
            return known.default_strategy();
        }
        match value {
            VariantValue::List(_) => RenderStrategy::ListItemReplace,
            VariantValue::Text(_) => RenderStrategy::TextReplace,
        }
    }
}

/// Locate and parse the embedded payload in a rendered page.
///
/// Returns `None` when the element is missing, carries the wrong type,
/// or holds anything but the exact payload shape. That is the common
/// case of a page with no active variant, not an error.
pub fn locate(document: &Html) -> Option<InjectionPayload> {
    let sel = Selector::parse(&format!("script#{PAYLOAD_ELEMENT_ID}"))
        .expect("payload selector is valid");
    let el = document.select(&sel).next()?;

    if el.value().attr("type") != Some("application/json") {
        return None;
    }

    let raw: String = el.text().collect();
    match serde_json::from_str::<InjectionPayload>(&raw) {
        Ok(payload) => Some(payload),
        Err(e) => {
            tracing::debug!("embedded payload present but unparseable: {e}");
            None
        }
    }
}
