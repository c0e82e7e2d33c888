//! Core data types for theme adapters.
//!
//! A theme adapter is the persisted output of discovery: for one storefront
//! theme it maps every canonical content field to a DOM locator plus
//! confidence and rendering-strategy metadata. Content variants never touch
//! theme templates directly — they bind to an adapter, and the injection
//! agent applies them through it.

pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The fixed set of canonical content fields a variant can override.
///
/// Every adapter, variant, and payload speaks in these keys. Anything a
/// theme exposes beyond them travels in `ElementSelector::attributes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKey {
    Title,
    Description,
    CtaPrimary,
    CtaSecondary,
    HeroImage,
    UspList,
    Badges,
}

impl FieldKey {
    /// All canonical fields in generated-markup order. Text fields come
    /// first because they gate template viability downstream.
    pub const ALL: [FieldKey; 7] = [
        FieldKey::Title,
        FieldKey::Description,
        FieldKey::CtaPrimary,
        FieldKey::CtaSecondary,
        FieldKey::HeroImage,
        FieldKey::UspList,
        FieldKey::Badges,
    ];

    /// The wire name for this key (matches the serde representation).
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKey::Title => "title",
            FieldKey::Description => "description",
            FieldKey::CtaPrimary => "cta_primary",
            FieldKey::CtaSecondary => "cta_secondary",
            FieldKey::HeroImage => "hero_image",
            FieldKey::UspList => "usp_list",
            FieldKey::Badges => "badges",
        }
    }

    /// Parse a wire name back into a key.
    pub fn parse(s: &str) -> Option<FieldKey> {
        Self::ALL.iter().copied().find(|k| k.as_str() == s)
    }

    /// The kind of DOM element this field binds to.
    pub fn field_type(&self) -> FieldType {
        match self {
            FieldKey::Title | FieldKey::Description => FieldType::Text,
            FieldKey::CtaPrimary | FieldKey::CtaSecondary => FieldType::Cta,
            FieldKey::HeroImage => FieldType::Image,
            FieldKey::UspList => FieldType::UspList,
            FieldKey::Badges => FieldType::Badge,
        }
    }

    /// The rendering strategy used when no explicit override is present.
    pub fn default_strategy(&self) -> RenderStrategy {
        match self {
            FieldKey::Title | FieldKey::CtaPrimary | FieldKey::CtaSecondary => {
                RenderStrategy::TextReplace
            }
            FieldKey::Description => RenderStrategy::HtmlReplace,
            FieldKey::HeroImage => RenderStrategy::ImageSrcReplace,
            FieldKey::UspList | FieldKey::Badges => RenderStrategy::ListItemReplace,
        }
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a content field by the kind of DOM element it targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldType {
    Text,
    Image,
    Cta,
    UspList,
    Badge,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Text => write!(f, "text"),
            FieldType::Image => write!(f, "image"),
            FieldType::Cta => write!(f, "cta"),
            FieldType::UspList => write!(f, "usp-list"),
            FieldType::Badge => write!(f, "badge"),
        }
    }
}

/// How variant content is written into a resolved DOM node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderStrategy {
    /// Replace the node's text content (markup-escaped).
    TextReplace,
    /// Replace the node's inner markup verbatim.
    HtmlReplace,
    /// Replace the node's `src` attribute.
    ImageSrcReplace,
    /// Regenerate the node's `<li>` children from an ordered string list.
    ListItemReplace,
}

/// One field's discovered binding inside a theme.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementSelector {
    /// Canonical field this selector binds.
    pub key: FieldKey,
    /// Primary CSS locator.
    pub selector: String,
    /// Used if the primary resolves to zero nodes at view time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_selector: Option<String>,
    /// Element kind the selector targets.
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Scorer confidence in [0, 1]. Higher means more corroborating
    /// signals; never defaulted.
    pub confidence: f32,
    /// Position in generated-markup layout. Never consulted at injection
    /// time — injection is per-field, independent.
    pub order: u32,
    /// Open extension data (e.g. the image alt source attribute).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    /// Set when confidence fell below the configured floor. The field is
    /// retained so downstream consumers can decide to exclude it.
    #[serde(default)]
    pub low_confidence: bool,
}

/// Discovery output for one theme: the ordered field bindings plus
/// identity and bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThemeAdapter {
    /// Stable identifier derived from the theme's structural signature,
    /// not its raw markup.
    pub theme_fingerprint: String,
    /// Field bindings; keys are unique within one adapter.
    pub selectors: Vec<ElementSelector>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ThemeAdapter {
    pub fn new(theme_fingerprint: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            theme_fingerprint: theme_fingerprint.into(),
            selectors: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Look up the binding for a canonical field.
    pub fn field(&self, key: FieldKey) -> Option<&ElementSelector> {
        self.selectors.iter().find(|s| s.key == key)
    }

    /// Insert a binding, replacing any existing one for the same key so
    /// the per-adapter uniqueness invariant holds.
    pub fn insert(&mut self, selector: ElementSelector) {
        self.selectors.retain(|s| s.key != selector.key);
        self.selectors.push(selector);
        self.selectors.sort_by_key(|s| s.order);
        self.updated_at = Utc::now();
    }

    /// Number of bindings at or above the confidence floor.
    pub fn confident_fields(&self) -> usize {
        self.selectors.iter().filter(|s| !s.low_confidence).count()
    }

    /// The flattened record consumed by the content/template pipeline.
    pub fn persisted(&self) -> PersistedAdapter {
        let mut selectors = BTreeMap::new();
        let mut confidence = BTreeMap::new();
        let mut strategies = BTreeMap::new();
        let mut order = Vec::with_capacity(self.selectors.len());

        for s in &self.selectors {
            let key = s.key.as_str().to_string();
            selectors.insert(key.clone(), s.selector.clone());
            confidence.insert(key.clone(), s.confidence);
            strategies.insert(key.clone(), s.key.default_strategy());
            order.push(key);
        }

        PersistedAdapter {
            theme_fingerprint: self.theme_fingerprint.clone(),
            selectors,
            order,
            confidence,
            strategies,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// The adapter shape handed to the content/template pipeline: flat maps
/// keyed by wire field name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedAdapter {
    pub theme_fingerprint: String,
    pub selectors: BTreeMap<String, String>,
    pub order: Vec<String>,
    pub confidence: BTreeMap<String, f32>,
    pub strategies: BTreeMap<String, RenderStrategy>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_key_roundtrip() {
        for key in FieldKey::ALL {
            assert_eq!(FieldKey::parse(key.as_str()), Some(key));
        }
        assert_eq!(FieldKey::parse("price"), None);
    }

    #[test]
    fn test_field_key_serde_matches_as_str() {
        for key in FieldKey::ALL {
            let json = serde_json::to_string(&key).unwrap();
            assert_eq!(json, format!("\"{}\"", key.as_str()));
        }
    }

    #[test]
    fn test_field_type_wire_names() {
        assert_eq!(
            serde_json::to_string(&FieldType::UspList).unwrap(),
            "\"usp-list\""
        );
        assert_eq!(serde_json::to_string(&FieldType::Cta).unwrap(), "\"cta\"");
    }

    #[test]
    fn test_insert_replaces_duplicate_key() {
        let mut adapter = ThemeAdapter::new("tf-test");
        adapter.insert(ElementSelector {
            key: FieldKey::Title,
            selector: "h1".into(),
            fallback_selector: None,
            field_type: FieldType::Text,
            confidence: 0.4,
            order: 0,
            attributes: BTreeMap::new(),
            low_confidence: true,
        });
        adapter.insert(ElementSelector {
            key: FieldKey::Title,
            selector: "#title".into(),
            fallback_selector: None,
            field_type: FieldType::Text,
            confidence: 0.9,
            order: 0,
            attributes: BTreeMap::new(),
            low_confidence: false,
        });

        assert_eq!(adapter.selectors.len(), 1);
        assert_eq!(adapter.field(FieldKey::Title).unwrap().selector, "#title");
    }

    #[test]
    fn test_persisted_shape() {
        let mut adapter = ThemeAdapter::new("tf-abc");
        adapter.insert(ElementSelector {
            key: FieldKey::HeroImage,
            selector: ".hero img".into(),
            fallback_selector: Some("main img".into()),
            field_type: FieldType::Image,
            confidence: 0.8,
            order: 4,
            attributes: BTreeMap::new(),
            low_confidence: false,
        });
        adapter.insert(ElementSelector {
            key: FieldKey::Title,
            selector: "#product-title".into(),
            fallback_selector: None,
            field_type: FieldType::Text,
            confidence: 0.95,
            order: 0,
            attributes: BTreeMap::new(),
            low_confidence: false,
        });

        let persisted = adapter.persisted();
        // Order vector follows the `order` field, not insertion order.
        assert_eq!(persisted.order, vec!["title", "hero_image"]);
        assert_eq!(
            persisted.selectors.get("title").map(String::as_str),
            Some("#product-title")
        );
        assert_eq!(
            persisted.strategies.get("hero_image"),
            Some(&RenderStrategy::ImageSrcReplace)
        );
    }
}
