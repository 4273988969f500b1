// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde_json::json;
use smartfetch::domain::services::content_scanner::{
    extract_inline_state, extract_ld_json, find_api_candidates,
};

const LISTING_PAGE: &str = r#"<!doctype html>
<html>
<head>
  <script type="application/ld+json">
    {"@context": "https://schema.org", "@type": "ItemList", "numberOfItems": 2}
  </script>
  <script TYPE="application/ld+json">{"@type": "Organization", "name": "Shop"}</script>
</head>
<body>
  <ul><li class="product">A</li><li class="product">B</li></ul>
  <script>
    window.__NEXT_DATA__ = {"page": "/list"};
    window.searchState = {"query": "shoes", "filters": [],};
    fetch('/api/search?q=shoes&page=2').then(r => r.json());
    axios({url: 'https://cdn.example.com/static/config.json'});
  </script>
</body>
</html>"#;

#[test]
fn test_realistic_listing_page() {
    let ld = extract_ld_json(LISTING_PAGE);
    assert_eq!(ld.len(), 2);
    assert_eq!(ld[0]["@type"], "ItemList");
    assert_eq!(ld[1]["name"], "Shop");

    assert_eq!(
        extract_inline_state(LISTING_PAGE),
        Some(json!({"query": "shoes", "filters": []}))
    );

    assert_eq!(
        find_api_candidates(LISTING_PAGE, "https://shop.example.com/list?q=shoes"),
        vec![
            "https://shop.example.com/api/search?q=shoes&page=2",
            "https://cdn.example.com/static/config.json",
        ]
    );
}

#[test]
fn test_initial_data_variants() {
    let html = r#"<script>window.__INITIAL_DATA__ = {"items": [1]};</script>"#;
    assert_eq!(extract_inline_state(html), Some(json!({"items": [1]})));

    let html = r#"<script>var APP_INITIAL_STATE = {"ready": true};</script>"#;
    assert_eq!(extract_inline_state(html), Some(json!({"ready": true})));
}

#[test]
fn test_relative_literals_without_leading_slash_are_kept() {
    let html = r#"fetch("api/v1/products.json")"#;
    assert_eq!(
        find_api_candidates(html, "https://example.com/shop/"),
        vec!["api/v1/products.json"]
    );
}
