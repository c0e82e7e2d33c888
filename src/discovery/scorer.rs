//! Selector candidate scoring for canonical content fields.
//!
//! Given a rendered page and a field type, produce candidate CSS selectors
//! each with a confidence in `[0.0, 1.0]` and a disambiguating fallback.
//! Scoring is a pure function of its inputs — no mutation, no network.
//!
//! # Confidence model
//!
//! Confidence combines four independent signals:
//!
//! * **semantics** — how strongly the element's tag / itemprop / role
//!   matches the field type (an `itemprop="name"` scores higher for a
//!   title than a bare `h2`);
//! * **position** — structural placement (first heading inside a product
//!   region scores higher than one in the footer);
//! * **shape** — content plausibility (non-empty text within expected
//!   length bounds, an image with a `src`, a list with 2–8 short items);
//! * **uniqueness** — whether the derived selector resolves back to
//!   exactly one node; a selector matching N>1 nodes is penalized.
//!
//! A candidate below the floor is still returned, flagged
//! `low_confidence` — omission is the consumer's decision, not ours.

use crate::adapter::FieldType;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;

/// Default confidence floor below which candidates are flagged.
pub const DEFAULT_CONFIDENCE_FLOOR: f32 = 0.5;

/// Signal weights. Semantics dominates because explicit markup intent
/// (itemprop, role) is the strongest evidence a theme gives us.
const W_SEMANTICS: f32 = 0.40;
const W_POSITION: f32 = 0.20;
const W_SHAPE: f32 = 0.20;
const W_UNIQUENESS: f32 = 0.20;

/// Max elements considered per probe; themes repeat card markup heavily
/// and everything past the first few is noise.
const MAX_PER_PROBE: usize = 8;

/// Tuning knobs for one scoring pass.
#[derive(Debug, Clone)]
pub struct ScoreHints {
    /// Candidates below this are flagged `low_confidence`.
    pub confidence_floor: f32,
}

impl Default for ScoreHints {
    fn default() -> Self {
        Self {
            confidence_floor: DEFAULT_CONFIDENCE_FLOOR,
        }
    }
}

/// One scored selector candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectorCandidate {
    pub selector: String,
    pub fallback_selector: Option<String>,
    pub confidence: f32,
    pub low_confidence: bool,
    /// Extra binding data (e.g. which attribute carries image alt text).
    pub attributes: BTreeMap<String, String>,
}

/// A probe pairs a query selector with the semantics score earned by
/// elements it matches.
struct Probe {
    query: &'static str,
    semantics: f32,
}

/// Probe banks per field type, strongest markup intent first.
const TEXT_PROBES: &[Probe] = &[
    Probe { query: "[itemprop=\"name\"]", semantics: 0.95 },
    Probe { query: "h1", semantics: 0.90 },
    Probe { query: "[itemprop=\"description\"]", semantics: 0.90 },
    Probe {
        query: ".product-title, .product__title, .product-name, .product_name",
        semantics: 0.85,
    },
    Probe {
        query: ".product-description, .product__description, .description, .product-details",
        semantics: 0.80,
    },
    Probe { query: "h2", semantics: 0.55 },
];

const CTA_PROBES: &[Probe] = &[
    Probe {
        query: "form[action*=\"cart\"] button, form[action*=\"cart\"] input[type=\"submit\"]",
        semantics: 0.95,
    },
    Probe {
        query: "button[name=\"add\"], button[data-add-to-cart], .add-to-cart, .product-form__submit",
        semantics: 0.90,
    },
    Probe { query: "a[role=\"button\"]", semantics: 0.75 },
    Probe { query: ".btn, .button, .cta", semantics: 0.65 },
    Probe { query: "button", semantics: 0.50 },
];

const IMAGE_PROBES: &[Probe] = &[
    Probe { query: "[itemprop=\"image\"]", semantics: 0.95 },
    Probe {
        query: ".product-image img, .product__media img, .product-gallery img, .hero img",
        semantics: 0.85,
    },
    Probe { query: "main img, article img", semantics: 0.60 },
    Probe { query: "img", semantics: 0.40 },
];

const USP_PROBES: &[Probe] = &[
    Probe {
        query: ".usp-list, .benefits, .product-benefits, .features, ul.usps",
        semantics: 0.90,
    },
    Probe { query: "main ul, article ul", semantics: 0.55 },
    Probe { query: "ul", semantics: 0.40 },
];

const BADGE_PROBES: &[Probe] = &[
    Probe {
        query: ".badge, .badges, .label, .product-badge, .tag, [data-badge]",
        semantics: 0.85,
    },
    Probe { query: "span.pill, .ribbon", semantics: 0.70 },
];

fn probes(field_type: FieldType) -> &'static [Probe] {
    match field_type {
        FieldType::Text => TEXT_PROBES,
        FieldType::Cta => CTA_PROBES,
        FieldType::Image => IMAGE_PROBES,
        FieldType::UspList => USP_PROBES,
        FieldType::Badge => BADGE_PROBES,
    }
}

/// Score selector candidates for one field type against a parsed page.
///
/// Returns candidates sorted by descending confidence; possibly empty.
pub fn score(document: &Html, field_type: FieldType, hints: &ScoreHints) -> Vec<SelectorCandidate> {
    let mut by_selector: BTreeMap<String, SelectorCandidate> = BTreeMap::new();

    for probe in probes(field_type) {
        let Ok(sel) = Selector::parse(probe.query) else {
            continue;
        };
        for (i, el) in document.select(&sel).take(MAX_PER_PROBE).enumerate() {
            let Some(primary) = derive_selector(&el) else {
                continue;
            };

            let semantics = probe.semantics;
            let position = position_signal(&el, i);
            let shape = shape_signal(&el, field_type);
            let uniqueness = uniqueness_signal(document, &primary);

            let confidence = (W_SEMANTICS * semantics
                + W_POSITION * position
                + W_SHAPE * shape
                + W_UNIQUENESS * uniqueness)
                .clamp(0.0, 1.0);

            let candidate = SelectorCandidate {
                fallback_selector: derive_fallback(&el, &primary),
                confidence,
                low_confidence: confidence < hints.confidence_floor,
                attributes: binding_attributes(&el, field_type),
                selector: primary.clone(),
            };

            // Several probes can land on the same element; keep the best.
            match by_selector.get(&primary) {
                Some(existing) if existing.confidence >= confidence => {}
                _ => {
                    by_selector.insert(primary, candidate);
                }
            }
        }
    }

    let mut candidates: Vec<SelectorCandidate> = by_selector.into_values().collect();
    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.selector.cmp(&b.selector))
    });
    candidates
}

// ── Signals ──────────────────────────────────────────────────────────────────

/// Classes and ids that mark the product region of a page.
const REGION_MARKERS: &[&str] = &["product", "pdp", "item-detail", "hero", "main-content"];

fn in_product_region(el: &ElementRef<'_>) -> bool {
    for ancestor in el.ancestors().filter_map(ElementRef::wrap) {
        let v = ancestor.value();
        if matches!(v.name(), "main" | "article") {
            return true;
        }
        let haystack = format!(
            "{} {}",
            v.attr("class").unwrap_or(""),
            v.attr("id").unwrap_or("")
        )
        .to_lowercase();
        if REGION_MARKERS.iter().any(|m| haystack.contains(m)) {
            return true;
        }
    }
    false
}

/// Position: product region plus being the probe's first match both count.
fn position_signal(el: &ElementRef<'_>, probe_index: usize) -> f32 {
    let mut s: f32 = 0.2;
    if in_product_region(el) {
        s += 0.5;
    }
    if probe_index == 0 {
        s += 0.3;
    }
    s.min(1.0)
}

/// Content plausibility per field type.
fn shape_signal(el: &ElementRef<'_>, field_type: FieldType) -> f32 {
    match field_type {
        FieldType::Text => {
            let len = element_text(el).chars().count();
            // Short headline or longer description both count as text.
            if (3..=120).contains(&len) || (121..=2000).contains(&len) {
                1.0
            } else if len > 0 {
                0.4
            } else {
                0.0
            }
        }
        FieldType::Cta => {
            let len = element_text(el).chars().count();
            let clickable = matches!(el.value().name(), "button" | "a" | "input");
            match (clickable, (2..=40).contains(&len)) {
                (true, true) => 1.0,
                (true, false) => 0.4,
                (false, true) => 0.5,
                _ => 0.0,
            }
        }
        FieldType::Image => {
            let v = el.value();
            let has_src = v.attr("src").is_some() || v.attr("data-src").is_some();
            let has_alt = v.attr("alt").map(|a| !a.is_empty()).unwrap_or(false);
            match (has_src, has_alt) {
                (true, true) => 1.0,
                (true, false) => 0.7,
                _ => 0.0,
            }
        }
        FieldType::UspList => {
            let li = Selector::parse("li").expect("li selector is valid");
            let items: Vec<String> = el.select(&li).map(|i| element_text(&i)).collect();
            let short = items
                .iter()
                .filter(|t| (3..=80).contains(&t.chars().count()))
                .count();
            if (2..=8).contains(&items.len()) && short == items.len() {
                1.0
            } else if !items.is_empty() {
                0.4
            } else {
                0.0
            }
        }
        FieldType::Badge => {
            let len = element_text(el).chars().count();
            if (1..=30).contains(&len) {
                1.0
            } else {
                0.2
            }
        }
    }
}

/// Re-query the derived selector: exactly one node is full marks, every
/// additional match halves the signal, zero (parse failure) rejects.
fn uniqueness_signal(document: &Html, selector: &str) -> f32 {
    let Ok(sel) = Selector::parse(selector) else {
        return 0.0;
    };
    match document.select(&sel).count() {
        0 => 0.0,
        1 => 1.0,
        n => 1.0 / n as f32,
    }
}

fn binding_attributes(el: &ElementRef<'_>, field_type: FieldType) -> BTreeMap<String, String> {
    let mut attrs = BTreeMap::new();
    if field_type == FieldType::Image {
        if el.value().attr("alt").is_some() {
            attrs.insert("alt_source".to_string(), "alt".to_string());
        }
        if el.value().attr("srcset").is_some() {
            attrs.insert("has_srcset".to_string(), "true".to_string());
        }
    }
    attrs
}

// ── Selector derivation ──────────────────────────────────────────────────────
//
// Derived selectors stay within the id / class / attribute / descendant
// subset so every consumer (including the streaming rewriter in the
// injection agent) can evaluate them.

/// Derive a primary selector for an element: id first, then tag+classes,
/// then an ancestor-scoped tag path.
fn derive_selector(el: &ElementRef<'_>) -> Option<String> {
    if let Some(id) = css_ident(el.value().attr("id")) {
        return Some(format!("#{id}"));
    }

    let tag = el.value().name().to_string();
    if let Some(class_sel) = class_selector(el) {
        return Some(scope_to_ancestor(el, &format!("{tag}{class_sel}")));
    }

    if let Some(itemprop) = el.value().attr("itemprop") {
        return Some(format!("{tag}[itemprop=\"{itemprop}\"]"));
    }

    // Bare tag, scoped to the nearest identifiable ancestor.
    let scoped = scope_to_ancestor(el, &tag);
    if scoped == tag && !matches!(tag.as_str(), "h1" | "main" | "body") {
        // An unscoped generic tag is too ambiguous to be worth emitting.
        return None;
    }
    Some(scoped)
}

/// A second, structurally different locator used when the primary fails
/// to resolve on a later render of the page.
fn derive_fallback(el: &ElementRef<'_>, primary: &str) -> Option<String> {
    let tag = el.value().name().to_string();

    let mut options = Vec::new();
    if let Some(itemprop) = el.value().attr("itemprop") {
        options.push(format!("{tag}[itemprop=\"{itemprop}\"]"));
    }
    if let Some(class_sel) = class_selector(el) {
        options.push(format!("{tag}{class_sel}"));
    }
    options.push(scope_to_ancestor(el, &tag));

    options.into_iter().find(|o| o != primary && o != &tag)
}

/// Up to two css-safe classes as a `.a.b` suffix.
fn class_selector(el: &ElementRef<'_>) -> Option<String> {
    let classes: Vec<&str> = el
        .value()
        .attr("class")?
        .split_whitespace()
        .filter(|c| is_css_ident(c))
        .take(2)
        .collect();
    if classes.is_empty() {
        None
    } else {
        Some(format!(".{}", classes.join(".")))
    }
}

/// Prefix `base` with the nearest ancestor carrying an id or a css-safe
/// class, to disambiguate repeated markup.
fn scope_to_ancestor(el: &ElementRef<'_>, base: &str) -> String {
    for ancestor in el.ancestors().filter_map(ElementRef::wrap) {
        if let Some(id) = css_ident(ancestor.value().attr("id")) {
            return format!("#{id} {base}");
        }
        if let Some(class_sel) = class_selector(&ancestor) {
            let tag = ancestor.value().name();
            if tag != "html" && tag != "body" {
                return format!("{tag}{class_sel} {base}");
            }
        }
    }
    base.to_string()
}

fn css_ident(attr: Option<&str>) -> Option<&str> {
    attr.filter(|s| is_css_ident(s))
}

/// Conservative identifier check: selectors built from anything outside
/// this set would need escaping that not every consumer supports.
fn is_css_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Visible text of an element, whitespace-collapsed.
fn element_text(el: &ElementRef<'_>) -> String {
    el.text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
