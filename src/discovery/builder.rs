//! Theme adapter assembly — the orchestration layer above the scorer.
//!
//! Builds the canonical field plan for one page, scores each field in
//! priority order (text fields before image/list fields, since they gate
//! template viability), and assembles the adapter incrementally so the
//! owning job can report progress after every field.
//!
//! Synchronous by design: `scraper`'s types are `!Send`, so the async job
//! runner wraps a build in `tokio::task::spawn_blocking` and passes a
//! cancellation probe that is checked between fields.

use crate::adapter::{ElementSelector, FieldKey, FieldType, ThemeAdapter};
use crate::discovery::scorer::{self, ScoreHints, SelectorCandidate};
use scraper::{Html, Selector};
use std::collections::HashSet;
use tracing::debug;

/// Options narrowing one build.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Field types to attempt; empty means all supported types.
    pub field_types: Vec<FieldType>,
    /// Confidence floor used for low-confidence annotation.
    pub confidence_floor: f32,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            field_types: Vec::new(),
            confidence_floor: scorer::DEFAULT_CONFIDENCE_FLOOR,
        }
    }
}

/// Outcome of one build run.
#[derive(Debug)]
pub enum BuildOutcome {
    Completed(ThemeAdapter),
    /// A cancel request was observed between fields. No partial adapter
    /// escapes.
    Cancelled,
}

/// The canonical fields this build will attempt, in scoring priority
/// order: requested types intersected with supported ones.
pub fn field_plan(options: &BuildOptions) -> Vec<FieldKey> {
    FieldKey::ALL
        .into_iter()
        .filter(|key| {
            options.field_types.is_empty() || options.field_types.contains(&key.field_type())
        })
        .collect()
}

/// Build a theme adapter for one rendered page.
///
/// `on_field(scored, total)` fires after each field finishes scoring;
/// `cancelled()` is probed between fields and stops the build without
/// exposing a partial adapter.
pub fn build(
    html: &str,
    theme_fingerprint: &str,
    options: &BuildOptions,
    mut on_field: impl FnMut(usize, usize),
    cancelled: impl Fn() -> bool,
) -> BuildOutcome {
    let document = Html::parse_document(html);
    let plan = field_plan(options);
    let total = plan.len();
    let hints = ScoreHints {
        confidence_floor: options.confidence_floor,
    };

    let mut adapter = ThemeAdapter::new(theme_fingerprint);
    let mut used_selectors: HashSet<String> = HashSet::new();

    for (idx, key) in plan.into_iter().enumerate() {
        if cancelled() {
            debug!("build cancelled after {idx}/{total} fields");
            return BuildOutcome::Cancelled;
        }

        let candidates = scorer::score(&document, key.field_type(), &hints);
        match select_for_key(&document, key, &candidates, &used_selectors) {
            Some(candidate) => {
                used_selectors.insert(candidate.selector.clone());
                adapter.insert(ElementSelector {
                    key,
                    selector: candidate.selector.clone(),
                    fallback_selector: candidate.fallback_selector.clone(),
                    field_type: key.field_type(),
                    confidence: candidate.confidence,
                    order: idx as u32,
                    attributes: candidate.attributes.clone(),
                    low_confidence: candidate.low_confidence,
                });
            }
            None => {
                // A scoring gap is not an error: the field is simply
                // absent from the adapter and the job still completes.
                debug!("no candidate for {key}, omitting from adapter");
            }
        }

        on_field(idx + 1, total);
    }

    BuildOutcome::Completed(adapter)
}

/// Choose the best candidate for a specific canonical field.
///
/// Several fields share a scorer field type (title and description are
/// both `text`), so the builder disambiguates by the resolved node's
/// content shape and never binds one selector to two fields.
fn select_for_key(
    document: &Html,
    key: FieldKey,
    candidates: &[SelectorCandidate],
    used: &HashSet<String>,
) -> Option<SelectorCandidate> {
    candidates
        .iter()
        .filter(|c| !used.contains(&c.selector))
        .find(|c| matches_key_shape(document, key, c))
        .cloned()
}

fn matches_key_shape(document: &Html, key: FieldKey, candidate: &SelectorCandidate) -> bool {
    let text_len = resolved_text_len(document, &candidate.selector);
    match key {
        FieldKey::Title => text_len.map(|n| (3..=140).contains(&n)).unwrap_or(false),
        FieldKey::Description => text_len.map(|n| n >= 40).unwrap_or(false),
        // Distinctness between primary and secondary CTA is handled by
        // the used-selector set; any remaining candidate qualifies.
        FieldKey::CtaPrimary
        | FieldKey::CtaSecondary
        | FieldKey::HeroImage
        | FieldKey::UspList
        | FieldKey::Badges => true,
    }
}

fn resolved_text_len(document: &Html, selector: &str) -> Option<usize> {
    let sel = Selector::parse(selector).ok()?;
    let el = document.select(&sel).next()?;
    let text: String = el.text().collect::<Vec<_>>().join(" ");
    Some(text.split_whitespace().collect::<Vec<_>>().join(" ").chars().count())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
    <html><body>
        <main id="product" class="product-page">
            <h1 id="product-title" class="product-title">Trail Runner 2</h1>
            <div class="product-description"><p>A lightweight shoe for long trails.
            Cushioned midsole, grippy outsole, and a breathable upper keep you
            comfortable over every kind of terrain.</p></div>
            <div class="product-image"><img id="hero" src="/shoe.jpg" alt="Trail Runner 2" /></div>
            <ul class="usp-list">
                <li>Free shipping</li>
                <li>30-day returns</li>
            </ul>
            <span class="badge">New</span>
            <form action="/cart/add" method="post">
                <button id="add-to-cart" class="btn add-to-cart">Add to cart</button>
                <a id="size-guide" role="button" class="btn btn-secondary">Size guide</a>
            </form>
        </main>
    </body></html>
    "#;

    fn build_page(options: &BuildOptions) -> ThemeAdapter {
        match build(PAGE, "tf-test", options, |_, _| {}, || false) {
            BuildOutcome::Completed(adapter) => adapter,
            BuildOutcome::Cancelled => panic!("unexpected cancellation"),
        }
    }

    #[test]
    fn test_full_page_binds_every_field() {
        let adapter = build_page(&BuildOptions::default());

        for key in FieldKey::ALL {
            assert!(adapter.field(key).is_some(), "missing {key}");
        }
        assert_eq!(adapter.field(FieldKey::Title).unwrap().selector, "#product-title");
        assert_eq!(adapter.field(FieldKey::HeroImage).unwrap().selector, "#hero");
    }

    #[test]
    fn test_field_keys_unique_and_selectors_distinct() {
        let adapter = build_page(&BuildOptions::default());

        let mut keys = HashSet::new();
        let mut selectors = HashSet::new();
        for s in &adapter.selectors {
            assert!(keys.insert(s.key), "duplicate key {}", s.key);
            assert!(selectors.insert(s.selector.clone()), "selector bound twice: {}", s.selector);
            assert!((0.0..=1.0).contains(&s.confidence));
        }
    }

    #[test]
    fn test_title_and_description_get_different_selectors() {
        let adapter = build_page(&BuildOptions::default());
        let title = adapter.field(FieldKey::Title).unwrap();
        let desc = adapter.field(FieldKey::Description).unwrap();
        assert_ne!(title.selector, desc.selector);
        assert!(desc.selector.contains("description"));
    }

    #[test]
    fn test_cta_primary_and_secondary_distinct() {
        let adapter = build_page(&BuildOptions::default());
        let primary = adapter.field(FieldKey::CtaPrimary).unwrap();
        let secondary = adapter.field(FieldKey::CtaSecondary).unwrap();
        assert_eq!(primary.selector, "#add-to-cart");
        assert_ne!(primary.selector, secondary.selector);
    }

    #[test]
    fn test_missing_field_is_omitted_not_failed() {
        let html = r#"
        <html><body><main id="product">
            <h1 id="t" class="product-title">Only A Title Here</h1>
        </main></body></html>
        "#;
        let outcome = build(html, "tf-x", &BuildOptions::default(), |_, _| {}, || false);
        let BuildOutcome::Completed(adapter) = outcome else {
            panic!("expected completion");
        };
        assert!(adapter.field(FieldKey::Title).is_some());
        assert!(adapter.field(FieldKey::HeroImage).is_none());
        assert!(adapter.field(FieldKey::UspList).is_none());
    }

    #[test]
    fn test_progress_reported_per_field() {
        let mut calls = Vec::new();
        build(PAGE, "tf-p", &BuildOptions::default(), |done, total| calls.push((done, total)), || {
            false
        });

        let total = FieldKey::ALL.len();
        assert_eq!(calls.len(), total);
        assert_eq!(calls.first(), Some(&(1, total)));
        assert_eq!(calls.last(), Some(&(total, total)));
        assert!(calls.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn test_cancellation_between_fields() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let scored = AtomicUsize::new(0);
        let outcome = build(
            PAGE,
            "tf-c",
            &BuildOptions::default(),
            |done, _| scored.store(done, Ordering::SeqCst),
            || scored.load(Ordering::SeqCst) >= 2,
        );
        assert!(matches!(outcome, BuildOutcome::Cancelled));
    }

    #[test]
    fn test_field_type_filter_narrows_plan() {
        let options = BuildOptions {
            field_types: vec![FieldType::Text],
            ..Default::default()
        };
        assert_eq!(
            field_plan(&options),
            vec![FieldKey::Title, FieldKey::Description]
        );

        let adapter = build_page(&options);
        assert!(adapter.field(FieldKey::Title).is_some());
        assert!(adapter.field(FieldKey::HeroImage).is_none());
    }

    #[test]
    fn test_low_confidence_annotated_not_dropped() {
        let html = r#"
        <html><body><div class="content">
            <ul></ul>
        </div></body></html>
        "#;
        let options = BuildOptions {
            field_types: vec![FieldType::UspList],
            ..Default::default()
        };
        let outcome = build(html, "tf-l", &options, |_, _| {}, || false);
        let BuildOutcome::Completed(adapter) = outcome else {
            panic!("expected completion");
        };
        let usp = adapter.field(FieldKey::UspList).expect("retained");
        assert!(usp.low_confidence);
    }
}
