//! Theme fingerprinting from a page's structural signature.
//!
//! The fingerprint keys the adapter store, so it must survive cosmetic
//! edits (copy changes, reordered inline text, new product data) while
//! changing when the theme's structure actually changes. It is therefore
//! computed from a skeleton of the DOM — tag names, id presence, and a
//! bounded class prefix per element — never from text content or
//! attribute values that vary per product.

use fnv::FnvHasher;
use scraper::{ElementRef, Html};
use std::hash::Hasher;

/// Elements that carry no structural meaning for a theme.
const SKIP_TAGS: &[&str] = &["script", "style", "noscript", "template", "svg", "path", "meta", "link"];

/// Depth cutoff: below this the tree is product content, not theme chrome.
const MAX_DEPTH: usize = 12;

/// Per-element cap on classes folded into the signature. Utility-class
/// themes attach dozens; the first few identify the element.
const MAX_CLASSES: usize = 3;

/// Compute a stable fingerprint for the theme structure of a rendered page.
pub fn fingerprint(document: &Html) -> String {
    let mut hasher = FnvHasher::default();
    let root = document.root_element();
    walk(&root, 0, &mut hasher);
    format!("tf-{:016x}", hasher.finish())
}

fn walk(el: &ElementRef<'_>, depth: usize, hasher: &mut FnvHasher) {
    if depth > MAX_DEPTH {
        return;
    }

    let v = el.value();
    let tag = v.name();
    if SKIP_TAGS.contains(&tag) {
        return;
    }

    hasher.write_usize(depth);
    hasher.write(tag.as_bytes());
    if v.attr("id").is_some() {
        hasher.write(b"#");
    }
    if let Some(classes) = v.attr("class") {
        let mut names: Vec<&str> = classes.split_whitespace().collect();
        names.sort_unstable();
        for class in names.into_iter().take(MAX_CLASSES) {
            hasher.write(b".");
            hasher.write(class.as_bytes());
        }
    }

    for child in el.children().filter_map(ElementRef::wrap) {
        walk(&child, depth + 1, hasher);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(html: &str) -> String {
        fingerprint(&Html::parse_document(html))
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let html = r#"<html><body><div class="product"><h1>Shoe</h1></div></body></html>"#;
        assert_eq!(fp(html), fp(html));
        assert!(fp(html).starts_with("tf-"));
    }

    #[test]
    fn test_text_changes_do_not_invalidate() {
        let a = r#"<html><body><div class="product"><h1>Trail Runner</h1></div></body></html>"#;
        let b = r#"<html><body><div class="product"><h1>City Sneaker XL</h1></div></body></html>"#;
        assert_eq!(fp(a), fp(b));
    }

    #[test]
    fn test_structural_changes_invalidate() {
        let a = r#"<html><body><div class="product"><h1>Shoe</h1></div></body></html>"#;
        let b = r#"<html><body><section class="product"><h1>Shoe</h1></section></body></html>"#;
        let c = r#"<html><body><div class="product-v2"><h1>Shoe</h1></div></body></html>"#;
        assert_ne!(fp(a), fp(b));
        assert_ne!(fp(a), fp(c));
    }

    #[test]
    fn test_class_order_is_irrelevant() {
        let a = r#"<html><body><div class="card product"><h1>Shoe</h1></div></body></html>"#;
        let b = r#"<html><body><div class="product card"><h1>Shoe</h1></div></body></html>"#;
        assert_eq!(fp(a), fp(b));
    }

    #[test]
    fn test_scripts_are_ignored() {
        let a = r#"<html><body><div class="p"></div></body></html>"#;
        let b = r#"<html><body><div class="p"></div><script>var x = 1;</script></body></html>"#;
        assert_eq!(fp(a), fp(b));
    }
}
