//! End-to-end injection scenarios through the agent's public entry point.

use veneer_runtime::inject::agent;

fn page_with_payload(body: &str, payload: &str) -> String {
    format!(
        r#"<!doctype html><html><head><title>Shop</title></head><body>
        <header id="nav"><a href="/">Home</a></header>
        {body}
        <footer id="footer">All rights reserved</footer>
        <script id="veneer-payload" type="application/json">{payload}</script>
        </body></html>"#
    )
}

#[test]
fn title_is_replaced_and_nothing_else_changes() {
    let doc = page_with_payload(
        r#"<h1 id="title">Old</h1><p class="subtitle">Keep me</p>"#,
        r##"{"variant_data":{"title":"New Title"},"theme_adapter":{"selectors":{"title":"#title"}}}"##,
    );
    let outcome = agent::apply(&doc);

    assert!(outcome.html.contains(r#"<h1 id="title">New Title</h1>"#));
    assert!(outcome.html.contains(r#"<p class="subtitle">Keep me</p>"#));
    assert!(outcome.html.contains(r#"<header id="nav"><a href="/">Home</a></header>"#));
    assert!(outcome.html.contains(r#"<footer id="footer">All rights reserved</footer>"#));
    assert_eq!(outcome.applied, vec!["title".to_string()]);
    assert!(outcome.diagnostics.is_empty());
}

#[test]
fn missing_selector_without_fallback_skips_with_one_diagnostic() {
    let doc = page_with_payload(
        r#"<h1 id="title">Original</h1>"#,
        r##"{"variant_data":{"title":"Never Applied"},"theme_adapter":{"selectors":{"title":"#missing"}}}"##,
    );
    let outcome = agent::apply(&doc);

    assert!(outcome.html.contains(r#"<h1 id="title">Original</h1>"#));
    assert_eq!(outcome.diagnostics.len(), 1);
    assert_eq!(outcome.diagnostics[0].field, "title");
    assert!(outcome.applied.is_empty());
}

#[test]
fn fallback_applies_when_primary_resolves_nothing() {
    let doc = page_with_payload(
        r#"<h1 class="product-heading">Original</h1>"#,
        r##"{"variant_data":{"title":"From Fallback"},
           "theme_adapter":{"selectors":{"title":"#renamed-away"},
                            "fallback_selectors":{"title":"h1.product-heading"}}}"##,
    );
    let outcome = agent::apply(&doc);

    assert!(outcome.html.contains(">From Fallback</h1>"));
    assert_eq!(outcome.applied, vec!["title".to_string()]);
}

#[test]
fn fields_absent_from_variant_data_are_left_alone() {
    let doc = page_with_payload(
        r#"<h1 id="title">Old Title</h1>
           <div id="desc">Handwritten description</div>
           <img id="hero" src="/original.jpg" />"#,
        r##"{"variant_data":{"title":"Campaign Title"},
           "theme_adapter":{"selectors":{
               "title":"#title","description":"#desc","hero_image":"#hero"}}}"##,
    );
    let outcome = agent::apply(&doc);

    assert!(outcome.html.contains(">Campaign Title</h1>"));
    assert!(outcome.html.contains(">Handwritten description</div>"));
    assert!(outcome.html.contains(r#"src="/original.jpg""#));
}

#[test]
fn page_without_payload_renders_unmodified() {
    let doc = "<html><body><h1>No variant here</h1></body></html>";
    let outcome = agent::apply(doc);
    assert_eq!(outcome.html, doc);
    assert!(outcome.applied.is_empty());
    assert!(outcome.diagnostics.is_empty());
}

#[test]
fn malformed_payload_renders_unmodified() {
    let doc = page_with_payload(r#"<h1 id="title">Old</h1>"#, r#"{"half": "a shape"}"#);
    let outcome = agent::apply(&doc);
    assert!(outcome.html.contains(r#"<h1 id="title">Old</h1>"#));
    assert!(outcome.applied.is_empty());
}

#[test]
fn applying_the_same_payload_twice_is_idempotent() {
    let doc = page_with_payload(
        r#"<h1 id="title">Old</h1>
           <img id="hero" src="/old.jpg" srcset="/old-2x.jpg 2x" />
           <ul id="usps"><li>stale</li></ul>"#,
        r##"{"variant_data":{
               "title":"Tom & Jerry Edition",
               "hero_image":"https://cdn.test/campaign.jpg",
               "usp_list":["Ships in 24h","Free returns"]},
           "theme_adapter":{"selectors":{
               "title":"#title","hero_image":"#hero","usp_list":"#usps"}}}"##,
    );

    let once = agent::apply(&doc);
    let twice = agent::apply(&once.html);

    assert_eq!(once.html, twice.html);
    assert!(once.html.contains("Tom &amp; Jerry Edition"));
    assert!(once.html.contains(r#"src="https://cdn.test/campaign.jpg""#));
    assert!(once.html.contains("<li>Ships in 24h</li><li>Free returns</li>"));
}

#[test]
fn full_variant_payload_applies_every_strategy() {
    let doc = page_with_payload(
        r#"<h1 id="title">Old</h1>
           <div id="desc">Old copy</div>
           <a id="buy" class="btn">Buy now</a>
           <img id="hero" src="/old.jpg" />
           <ul id="usps"><li>old</li></ul>
           <ul id="badges"><li>old badge</li></ul>"#,
        r##"{"variant_data":{
               "title":"Summer Sale Runner",
               "description":"<p>Limited <strong>summer</strong> colorway.</p>",
               "cta_primary":"Grab yours",
               "hero_image":"https://cdn.test/summer.jpg",
               "usp_list":["Breathable mesh","Recycled sole"],
               "badges":["Limited"]},
           "theme_adapter":{"selectors":{
               "title":"#title","description":"#desc","cta_primary":"#buy",
               "hero_image":"#hero","usp_list":"#usps","badges":"#badges"}}}"##,
    );
    let outcome = agent::apply(&doc);

    assert_eq!(outcome.applied.len(), 6);
    assert!(outcome.diagnostics.is_empty());
    assert!(outcome.html.contains(">Summer Sale Runner</h1>"));
    assert!(outcome.html.contains("<p>Limited <strong>summer</strong> colorway.</p>"));
    assert!(outcome.html.contains(">Grab yours</a>"));
    assert!(outcome.html.contains(r#"src="https://cdn.test/summer.jpg""#));
    assert!(outcome.html.contains("<li>Breathable mesh</li><li>Recycled sole</li>"));
    assert!(outcome.html.contains("<li>Limited</li>"));
}

#[test]
fn one_failed_field_does_not_block_the_rest() {
    let doc = page_with_payload(
        r#"<h1 id="title">Old</h1>"#,
        r##"{"variant_data":{"title":"Applied","description":"Skipped"},
           "theme_adapter":{"selectors":{"title":"#title","description":"#nowhere"}}}"##,
    );
    let outcome = agent::apply(&doc);

    assert!(outcome.html.contains(">Applied</h1>"));
    assert_eq!(outcome.applied, vec!["title".to_string()]);
    assert_eq!(outcome.diagnostics.len(), 1);
    assert_eq!(outcome.diagnostics[0].field, "description");
}
