// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{harness, test_settings, FakeFetcher, FakePage, FakeRenderer};
use async_trait::async_trait;
use serde_json::{json, Value};
use smartfetch::domain::models::extraction::Stage;
use smartfetch::domain::models::fetch_task::FetchTask;
use smartfetch::domain::models::manifest::ManifestRecord;
use smartfetch::domain::repositories::manifest_repository::{ManifestError, ManifestRepository};
use smartfetch::domain::repositories::storage_repository::StorageRepository;
use smartfetch::domain::services::outcome_recorder::{OutcomeRecorder, NO_CONTENT};
use smartfetch::engines::render_adapter::SCROLL_SCRIPT;
use smartfetch::engines::traits::RenderResponse;
use smartfetch::config::settings::DEFAULT_WAIT_FOR;
use smartfetch::infrastructure::manifest::InMemoryManifest;
use smartfetch::infrastructure::storage::InMemoryStorage;
use smartfetch::workers::governor::ConcurrencyGovernor;
use smartfetch::workers::pipeline::EscalationPipeline;
use std::sync::Arc;
use std::time::Duration;

const PRODUCT_PAGE: &str = r#"<html><head>
<script type="application/ld+json">{"@type":"Product","name":"Shoe"}</script>
</head><body></body></html>"#;

async fn artifact_json(storage: &impl StorageRepository, key: &str) -> Value {
    let bytes = storage.get(key).await.unwrap().expect("artifact exists");
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_fast_json_page() {
    let url = "https://shop.example.com/p/1";
    let fetcher = Arc::new(FakeFetcher::new().with_page(url, FakePage::html(PRODUCT_PAGE)));
    let renderer = Arc::new(FakeRenderer::with_html_len(5000));
    let h = harness(&test_settings(), fetcher.clone(), renderer.clone());

    let record = h.pipeline.process_url(url).await;

    assert_eq!(record.stage, Stage::FastJson);
    assert!(record.ok);
    assert_eq!(record.http_status, Some(200));
    assert_eq!(record.final_url.as_deref(), Some(url));
    assert_eq!(renderer.calls(), 0);

    let key = OutcomeRecorder::artifact_key(&FetchTask::new(url), "json", false);
    let body = artifact_json(&h.storage, &key).await;
    assert_eq!(body["ld"][0]["@type"], "Product");
    assert_eq!(body["ld"][0]["name"], "Shoe");
    assert!(body["inline"].is_null());
    assert_eq!(h.storage.keys().await.len(), 1);
}

#[tokio::test]
async fn test_inline_state_page() {
    let url = "https://shop.example.com/p/2";
    let page = r#"<script>window.__INITIAL_STATE__ = {"cart": {"items": [1,],},};</script>"#;
    let fetcher = Arc::new(FakeFetcher::new().with_page(url, FakePage::html(page)));
    let renderer = Arc::new(FakeRenderer::with_html_len(5000));
    let h = harness(&test_settings(), fetcher, renderer.clone());

    let record = h.pipeline.process_url(url).await;

    assert_eq!(record.stage, Stage::FastJson);
    let key = OutcomeRecorder::artifact_key(&FetchTask::new(url), "json", false);
    let body = artifact_json(&h.storage, &key).await;
    assert_eq!(body["inline"], json!({"cart": {"items": [1]}}));
    assert_eq!(body["ld"], json!([]));
    assert_eq!(renderer.calls(), 0);
}

#[tokio::test]
async fn test_fast_api_page() {
    let url = "https://shop.example.com/list";
    let page = r#"<html><script>fetch('/api/items').then(r => r.json())</script></html>"#;
    let fetcher = Arc::new(
        FakeFetcher::new()
            .with_page(url, FakePage::html(page))
            .with_page(
                "https://shop.example.com/api/items",
                FakePage::html(r#"{"items":[1,2,3]}"#),
            ),
    );
    let renderer = Arc::new(FakeRenderer::with_html_len(5000));
    let h = harness(&test_settings(), fetcher.clone(), renderer.clone());

    let record = h.pipeline.process_url(url).await;

    assert_eq!(record.stage, Stage::FastApi);
    assert!(record.ok);
    assert_eq!(record.api.as_deref(), Some("https://shop.example.com/api/items"));
    assert_eq!(renderer.calls(), 0);
    assert_eq!(fetcher.calls("https://shop.example.com/api/items"), 1);

    let key = OutcomeRecorder::artifact_key(&FetchTask::new(url), "json", false);
    assert_eq!(
        artifact_json(&h.storage, &key).await,
        json!({"api": {"items": [1, 2, 3]}})
    );
}

#[tokio::test]
async fn test_api_candidates_resolve_against_final_url() {
    let url = "https://short.example.com/go";
    let page = r#"<script>axios.get("/api/v2/catalog")</script>"#;
    let fetcher = Arc::new(
        FakeFetcher::new()
            .with_page(
                url,
                FakePage::Redirect {
                    final_url: "https://shop.example.com/catalog".into(),
                    body: page.into(),
                },
            )
            .with_page(
                "https://shop.example.com/api/v2/catalog",
                FakePage::html(r#"cb({"total": 2});"#),
            ),
    );
    let renderer = Arc::new(FakeRenderer::with_html_len(5000));
    let h = harness(&test_settings(), fetcher, renderer);

    let record = h.pipeline.process_url(url).await;

    assert_eq!(record.stage, Stage::FastApi);
    assert_eq!(record.final_url.as_deref(), Some("https://shop.example.com/catalog"));
    assert_eq!(record.api.as_deref(), Some("https://shop.example.com/api/v2/catalog"));
}

#[tokio::test]
async fn test_failing_and_empty_candidates_are_skipped() {
    let url = "https://shop.example.com/list";
    let page = r#"<script>
        fetch('/api/broken/1');
        fetch('/api/empty/22');
        fetch('/api/good/333');
    </script>"#;
    let fetcher = Arc::new(
        FakeFetcher::new()
            .with_page(url, FakePage::html(page))
            .with_page("https://shop.example.com/api/empty/22", FakePage::html("{}"))
            .with_page(
                "https://shop.example.com/api/good/333",
                FakePage::html(r#"[{"sku": "A"}]"#),
            ),
    );
    let renderer = Arc::new(FakeRenderer::with_html_len(5000));
    let h = harness(&test_settings(), fetcher.clone(), renderer.clone());

    let record = h.pipeline.process_url(url).await;

    assert_eq!(record.stage, Stage::FastApi);
    assert_eq!(record.api.as_deref(), Some("https://shop.example.com/api/good/333"));
    // 传输错误重试到上限，空结果不重试
    assert_eq!(fetcher.calls("https://shop.example.com/api/broken/1"), 3);
    assert_eq!(fetcher.calls("https://shop.example.com/api/empty/22"), 1);
    assert_eq!(renderer.calls(), 0);
}

#[tokio::test]
async fn test_heavy_render_page() {
    let url = "https://spa.example.com/catalog";
    let fetcher = Arc::new(
        FakeFetcher::new().with_page(url, FakePage::html("<html><body>loading</body></html>")),
    );
    let renderer = Arc::new(FakeRenderer::returning(RenderResponse {
        success: true,
        html: "y".repeat(5000),
        screenshot: Some(vec![0x89, b'P', b'N', b'G']),
        error_message: None,
    }));
    let h = harness(&test_settings(), fetcher, renderer.clone());

    let record = h.pipeline.process_url(url).await;

    assert_eq!(record.stage, Stage::Heavy);
    assert!(record.ok);
    assert!(record.path.as_deref().unwrap().ends_with(".html"));
    assert_eq!(renderer.calls(), 1);

    let request = &renderer.requests()[0];
    assert_eq!(request.url, url);
    assert_eq!(request.wait_for.as_deref(), Some(DEFAULT_WAIT_FOR));
    assert_eq!(request.js_code, SCROLL_SCRIPT.to_vec());

    let task = FetchTask::new(url);
    let html = h
        .storage
        .get(&OutcomeRecorder::artifact_key(&task, "html", false))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(html.len(), 5000);
    assert!(h
        .storage
        .exists(&OutcomeRecorder::artifact_key(&task, "png", false))
        .await
        .unwrap());
    assert_eq!(h.pipeline.governor().heavy_available(), 6);
}

#[tokio::test]
async fn test_short_render_fails_with_diagnostic_prefix() {
    let url = "https://spa.example.com/empty";
    let fetched = "z".repeat(10_000);
    let fetcher = Arc::new(FakeFetcher::new().with_page(url, FakePage::html(fetched)));
    let renderer = Arc::new(FakeRenderer::with_html_len(100));
    let h = harness(&test_settings(), fetcher, renderer);

    let record = h.pipeline.process_url(url).await;

    assert_eq!(record.stage, Stage::Failed);
    assert!(!record.ok);
    assert_eq!(record.err.as_deref(), Some(NO_CONTENT));

    let key = OutcomeRecorder::artifact_key(&FetchTask::new(url), "html", true);
    let saved = h.storage.get(&key).await.unwrap().unwrap();
    assert!(saved.len() <= 4000);
    assert_eq!(saved.len(), 4000);
    assert_eq!(h.storage.keys().await, vec![key]);
}

#[tokio::test]
async fn test_render_at_minimum_length_is_not_enough() {
    let url = "https://spa.example.com/edge";
    let fetcher = Arc::new(FakeFetcher::new().with_page(url, FakePage::html("<html></html>")));
    let renderer = Arc::new(FakeRenderer::with_html_len(2000));
    let h = harness(&test_settings(), fetcher, renderer);

    let record = h.pipeline.process_url(url).await;
    assert_eq!(record.stage, Stage::Failed);
}

#[tokio::test]
async fn test_render_failure_reason_is_recorded() {
    let url = "https://spa.example.com/broken";
    let fetcher = Arc::new(FakeFetcher::new().with_page(url, FakePage::html("<html></html>")));
    let renderer = Arc::new(FakeRenderer::returning(RenderResponse::failed(
        "wait condition not met",
    )));
    let h = harness(&test_settings(), fetcher, renderer);

    let record = h.pipeline.process_url(url).await;

    assert_eq!(record.stage, Stage::Failed);
    assert_eq!(record.err.as_deref(), Some("wait condition not met"));
}

#[tokio::test]
async fn test_error_status_pages_are_still_scanned() {
    let url = "https://shop.example.com/gone";
    let fetcher = Arc::new(FakeFetcher::new().with_page(
        url,
        FakePage::Ok {
            status: 404,
            body: PRODUCT_PAGE.to_string(),
        },
    ));
    let renderer = Arc::new(FakeRenderer::with_html_len(5000));
    let h = harness(&test_settings(), fetcher, renderer);

    let record = h.pipeline.process_url(url).await;

    assert_eq!(record.stage, Stage::FastJson);
    assert_eq!(record.http_status, Some(404));
}

#[tokio::test]
async fn test_fetch_timeout_becomes_exception() {
    let url = "https://slow.example.com/p";
    let fetcher = Arc::new(FakeFetcher::new().with_page(url, FakePage::Timeout));
    let renderer = Arc::new(FakeRenderer::with_html_len(5000));
    let h = harness(&test_settings(), fetcher, renderer.clone());

    let record = h.pipeline.process_url(url).await;

    assert_eq!(record.stage, Stage::Exception);
    assert!(!record.ok);
    assert!(record.err.as_deref().unwrap().contains("Timeout"));
    assert!(record.http_status.is_none());
    assert!(record.path.is_none());
    assert_eq!(renderer.calls(), 0);
    assert!(h.storage.keys().await.is_empty());

    let governor = h.pipeline.governor();
    assert_eq!(governor.global_available(), 16);
    assert_eq!(governor.domain_available("slow.example.com"), 3);
    assert_eq!(governor.heavy_available(), 6);
    assert_eq!(h.manifest.records().await, vec![record]);
}

#[tokio::test]
async fn test_force_render_skips_fast_paths() {
    let url = "https://shop.example.com/p/1";
    let fetcher = Arc::new(FakeFetcher::new().with_page(url, FakePage::html(PRODUCT_PAGE)));
    let renderer = Arc::new(FakeRenderer::with_html_len(5000));
    let mut settings = test_settings();
    settings.pipeline.force_render = true;
    let h = harness(&settings, fetcher, renderer.clone());

    let record = h.pipeline.process_url(url).await;

    assert_eq!(record.stage, Stage::Heavy);
    assert_eq!(renderer.calls(), 1);
}

#[tokio::test]
async fn test_fast_paths_never_take_a_render_permit() {
    let url = "https://shop.example.com/p/1";
    let fetcher = Arc::new(FakeFetcher::new().with_page(url, FakePage::html(PRODUCT_PAGE)));
    let renderer = Arc::new(FakeRenderer::with_html_len(5000));
    let mut settings = test_settings();
    settings.concurrency.heavy = 1;
    let h = harness(&settings, fetcher, renderer);

    // 占满渲染名额，快速路径仍然必须完成
    let _held = h.pipeline.governor().acquire_heavy().await.unwrap();
    let record = tokio::time::timeout(Duration::from_secs(5), h.pipeline.process_url(url))
        .await
        .expect("fast path must not wait for a render permit");

    assert_eq!(record.stage, Stage::FastJson);
}

#[tokio::test]
async fn test_renderer_panic_is_recorded_as_failed() {
    let url = "https://spa.example.com/crash";
    let fetcher = Arc::new(FakeFetcher::new().with_page(url, FakePage::html("<html>shell</html>")));
    let renderer = Arc::new(FakeRenderer::panicking());
    let h = harness(&test_settings(), fetcher, renderer.clone());

    let record = h.pipeline.process_url(url).await;

    assert_eq!(record.stage, Stage::Failed);
    assert!(record.err.as_deref().unwrap().contains("renderer exploded"));
    assert_eq!(renderer.calls(), 1);

    let key = OutcomeRecorder::artifact_key(&FetchTask::new(url), "html", true);
    assert_eq!(
        h.storage.get(&key).await.unwrap().unwrap(),
        b"<html>shell</html>".to_vec()
    );
    assert_eq!(h.pipeline.governor().heavy_available(), 6);
    assert_eq!(h.manifest.records().await, vec![record]);
}

/// 整行写入后刷盘失败的清单
struct SyncFailingManifest {
    inner: InMemoryManifest,
}

#[async_trait]
impl ManifestRepository for SyncFailingManifest {
    async fn append(&self, record: &ManifestRecord) -> Result<(), ManifestError> {
        self.inner.append(record).await?;
        Err(ManifestError::Io(std::io::Error::other("fsync: invalid argument")))
    }
}

#[tokio::test]
async fn test_manifest_sync_error_does_not_duplicate_record() {
    let url = "https://shop.example.com/p/1";
    let settings = test_settings();
    let fetcher = Arc::new(FakeFetcher::new().with_page(url, FakePage::html(PRODUCT_PAGE)));
    let inner = InMemoryManifest::new();
    let pipeline = EscalationPipeline::new(
        &settings,
        ConcurrencyGovernor::from_settings(&settings.concurrency),
        fetcher,
        Arc::new(FakeRenderer::with_html_len(5000)),
        Arc::new(InMemoryStorage::new()),
        Arc::new(SyncFailingManifest {
            inner: inner.clone(),
        }),
    );

    let record = pipeline.process_url(url).await;

    assert_eq!(record.stage, Stage::FastJson);
    let records = inner.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].stage, Stage::FastJson);
}
