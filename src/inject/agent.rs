//! The variant injection agent.
//!
//! Runs once per rendered page, single pass, no retries, no network.
//! Reads the embedded payload and rewrites the targeted nodes; every
//! failure mode degrades to "fewer fields injected", never to a broken
//! page. [`apply`] is the one externally callable operation, so test
//! harnesses can drive injection without any page lifecycle.
//!
//! Two passes over the document:
//!
//! 1. **resolve** (`scraper`): for each field present in both
//!    `variant_data` and the selector map, pick the primary selector if
//!    it matches at least one node, else the fallback, else record a
//!    diagnostic and skip the field;
//! 2. **rewrite** (`lol_html`): stream the page through element handlers
//!    for the chosen selectors, applying each field's strategy as a
//!    replacement so a second application of the same payload is a
//!    no-op.

use crate::adapter::RenderStrategy;
use crate::inject::payload::{self, InjectionPayload, VariantValue};
use lol_html::html_content::{ContentType, Element};
use lol_html::{element, HtmlRewriter, Selector as RewriteSelector, Settings};
use scraper::{Html, Selector};
use tracing::debug;

/// A skipped field and why. Diagnostic only — the page is unaffected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub field: String,
    pub selector: String,
    pub reason: String,
}

/// Result of one injection pass.
#[derive(Debug, Clone)]
pub struct InjectionOutcome {
    /// The page markup after injection. Identical to the input when no
    /// payload was found or nothing resolved.
    pub html: String,
    /// Fields that were written into the page.
    pub applied: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
}

/// One resolved field ready for the rewrite pass.
struct Binding {
    field: String,
    selector: String,
    strategy: RenderStrategy,
    value: VariantValue,
}

/// Apply the page's embedded variant payload to its own markup.
///
/// Absent or malformed payload is the common no-variant case: the input
/// is returned unmodified and silently.
pub fn apply(document: &str) -> InjectionOutcome {
    let parsed = Html::parse_document(document);
    let Some(payload) = payload::locate(&parsed) else {
        return InjectionOutcome {
            html: document.to_string(),
            applied: Vec::new(),
            diagnostics: Vec::new(),
        };
    };

    let mut diagnostics = Vec::new();
    let bindings = resolve_bindings(&parsed, &payload, &mut diagnostics);

    if bindings.is_empty() {
        return InjectionOutcome {
            html: document.to_string(),
            applied: Vec::new(),
            diagnostics,
        };
    }

    rewrite(document, bindings, diagnostics)
}

/// Pass 1: decide, per field, which selector (if any) will be rewritten.
fn resolve_bindings(
    parsed: &Html,
    payload: &InjectionPayload,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<Binding> {
    let mut bindings = Vec::new();

    for (field, value) in &payload.variant_data {
        // Only fields present in *both* halves of the payload are
        // injection targets; everything else is someone else's data.
        let Some(primary) = payload.theme_adapter.selectors.get(field) else {
            continue;
        };

        let fallback = payload.theme_adapter.fallback_selectors.get(field);
        let chosen = if matches_any(parsed, primary) {
            Some(primary.as_str())
        } else {
            fallback
                .filter(|fb| matches_any(parsed, fb))
                .map(String::as_str)
        };

        match chosen {
            Some(selector) => bindings.push(Binding {
                field: field.clone(),
                selector: selector.to_string(),
                strategy: payload.strategy_for(field, value),
                value: value.clone(),
            }),
            None => {
                debug!("field {field}: selector {primary:?} resolved no nodes, skipping");
                diagnostics.push(Diagnostic {
                    field: field.clone(),
                    selector: primary.clone(),
                    reason: "no nodes matched primary or fallback selector".into(),
                });
            }
        }
    }

    bindings
}

fn matches_any(parsed: &Html, selector: &str) -> bool {
    match Selector::parse(selector) {
        Ok(sel) => parsed.select(&sel).next().is_some(),
        Err(_) => false,
    }
}

/// Pass 2: stream the document through per-field element handlers.
fn rewrite(
    document: &str,
    bindings: Vec<Binding>,
    mut diagnostics: Vec<Diagnostic>,
) -> InjectionOutcome {
    let mut handlers = Vec::new();
    let mut applied = Vec::new();

    for binding in bindings {
        // Validate against the rewriter's selector grammar up front; the
        // handler macro would panic on an unparseable selector.
        if let Err(e) = binding.selector.parse::<RewriteSelector>() {
            diagnostics.push(Diagnostic {
                field: binding.field.clone(),
                selector: binding.selector.clone(),
                reason: format!("rewriter rejected selector: {e}"),
            });
            continue;
        }

        applied.push(binding.field.clone());
        let strategy = binding.strategy;
        let value = binding.value;
        handlers.push(element!(binding.selector, move |el: &mut Element| {
            apply_strategy(el, strategy, &value);
            Ok(())
        }));
    }

    if handlers.is_empty() {
        return InjectionOutcome {
            html: document.to_string(),
            applied,
            diagnostics,
        };
    }

    let mut output = Vec::with_capacity(document.len());
    let result = {
        let mut rewriter = HtmlRewriter::new(
            Settings {
                element_content_handlers: handlers,
                ..Settings::new()
            },
            |chunk: &[u8]| output.extend_from_slice(chunk),
        );
        match rewriter.write(document.as_bytes()) {
            Ok(()) => rewriter.end(),
            Err(e) => Err(e),
        }
    };
    if let Err(e) = result {
        // The page must render no matter what: hand back the original.
        debug!("rewrite failed, page left unmodified: {e}");
        diagnostics.push(Diagnostic {
            field: String::new(),
            selector: String::new(),
            reason: format!("rewrite failed: {e}"),
        });
        return InjectionOutcome {
            html: document.to_string(),
            applied: Vec::new(),
            diagnostics,
        };
    }

    let html = String::from_utf8(output).unwrap_or_else(|_| document.to_string());
    InjectionOutcome {
        html,
        applied,
        diagnostics,
    }
}

/// Write one field into one element. Replacement, never append, so the
/// operation is idempotent.
fn apply_strategy(el: &mut Element<'_, '_>, strategy: RenderStrategy, value: &VariantValue) {
    match strategy {
        RenderStrategy::TextReplace => {
            el.set_inner_content(&value.as_text(), ContentType::Text);
        }
        RenderStrategy::HtmlReplace => {
            el.set_inner_content(&value.as_text(), ContentType::Html);
        }
        RenderStrategy::ImageSrcReplace => {
            let url = value.as_text();
            if el.set_attribute("src", &url).is_ok() {
                // A stale srcset would override the new src at render time.
                el.remove_attribute("srcset");
            }
        }
        RenderStrategy::ListItemReplace => {
            let items: String = value
                .as_list()
                .iter()
                .map(|item| format!("<li>{}</li>", escape_text(item)))
                .collect();
            el.set_inner_content(&items, ContentType::Html);
        }
    }
}

fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
