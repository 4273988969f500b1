// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use anyhow::{bail, Context};
use clap::Parser;
use smartfetch::config::settings::Settings;
use smartfetch::engines::chromium_engine::ChromiumEngine;
use smartfetch::engines::reqwest_engine::ReqwestEngine;
use smartfetch::infrastructure::manifest::JsonlManifest;
use smartfetch::infrastructure::metrics::init_metrics;
use smartfetch::infrastructure::storage::LocalStorage;
use smartfetch::utils::telemetry;
use smartfetch::workers::governor::ConcurrencyGovernor;
use smartfetch::workers::manager;
use smartfetch::workers::pipeline::EscalationPipeline;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// 命令行参数
#[derive(Debug, Parser)]
#[command(
    name = "smartfetch",
    version,
    about = "Extract product data from web pages, escalating from static fetch to headless render"
)]
struct Cli {
    /// File with one URL per line
    input: Option<PathBuf>,

    /// Additional URL to process (repeatable)
    #[arg(long = "url", value_name = "URL")]
    urls: Vec<String>,

    /// Extra configuration file
    #[arg(short, long, value_name = "FILE", env = "SMARTFETCH_CONFIG")]
    config: Option<PathBuf>,

    /// Output directory for artifacts and the manifest
    #[arg(short, long, value_name = "DIR")]
    out: Option<PathBuf>,

    /// Global concurrency limit
    #[arg(long, value_name = "N")]
    global: Option<usize>,

    /// Per-domain concurrency limit
    #[arg(long, value_name = "N")]
    per_domain: Option<usize>,

    /// Concurrent browser render limit
    #[arg(long, value_name = "N")]
    heavy: Option<usize>,

    /// CSS selector to wait for when rendering (empty disables waiting)
    #[arg(long, value_name = "CSS")]
    wait_for: Option<String>,

    /// Skip the fast paths and render every page
    #[arg(long)]
    force_render: bool,

    /// Save a PNG screenshot next to rendered pages
    #[arg(long)]
    screenshot: bool,

    /// Connect to a running Chrome over its DevTools websocket instead of launching one
    #[arg(long, value_name = "WS_URL")]
    remote_chrome: Option<String>,
}

impl Cli {
    /// 命令行参数覆盖已加载的配置
    fn apply(&self, settings: &mut Settings) {
        if let Some(out) = &self.out {
            settings.output.dir = out.clone();
        }
        if let Some(global) = self.global {
            settings.concurrency.global = global;
        }
        if let Some(per_domain) = self.per_domain {
            settings.concurrency.per_domain = per_domain;
        }
        if let Some(heavy) = self.heavy {
            settings.concurrency.heavy = heavy;
        }
        if let Some(wait_for) = &self.wait_for {
            settings.render.wait_for = if wait_for.trim().is_empty() {
                None
            } else {
                Some(wait_for.clone())
            };
        }
        if self.force_render {
            settings.pipeline.force_render = true;
        }
        if self.screenshot {
            settings.render.capture_screenshot = true;
        }
        if let Some(remote) = &self.remote_chrome {
            settings.render.remote_debugging_url = Some(remote.clone());
        }
    }
}

/// 主函数
///
/// 加载配置、读取URL列表、运行流水线并打印汇总。单个URL的失败不影响退出码。
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 1. Load configuration
    let mut settings = Settings::load(cli.config.as_deref()).context("Failed to load configuration")?;
    cli.apply(&mut settings);
    settings.check().context("Invalid configuration after command line overrides")?;

    // 2. Initialize logging and metrics
    telemetry::init_telemetry(&settings.logging);
    init_metrics(&settings.metrics);
    info!("Starting smartfetch...");

    // 3. Collect URLs
    let mut urls = match &cli.input {
        Some(path) => manager::read_url_list(path).await?,
        None => Vec::new(),
    };
    urls.extend(cli.urls.iter().cloned());
    if urls.is_empty() {
        bail!("No URLs given: pass an input file or --url");
    }

    // 4. Wire up the pipeline
    let storage = Arc::new(LocalStorage::new(settings.output.dir.clone()));
    let manifest = Arc::new(
        JsonlManifest::open(settings.output.manifest_path())
            .await
            .context("Failed to open manifest")?,
    );
    let fetcher = Arc::new(ReqwestEngine::new(settings.http.user_agent())?);
    let renderer = Arc::new(ChromiumEngine::from_settings(&settings.render));
    let governor = ConcurrencyGovernor::from_settings(&settings.concurrency);

    let pipeline = Arc::new(EscalationPipeline::new(
        &settings, governor, fetcher, renderer, storage, manifest,
    ));
    info!(
        "Processing {} URLs into {}",
        urls.len(),
        settings.output.dir.display()
    );

    // 5. Run
    let summary = manager::run_urls(pipeline, urls).await;
    println!("{}", summary);

    Ok(())
}
