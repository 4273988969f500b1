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

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use crate::config::settings::{HttpSettings, Settings};
use crate::domain::models::extraction::{is_usable_json, ExtractionResult};
use crate::domain::models::fetch_task::FetchTask;
use crate::domain::models::manifest::{ManifestRecord, TaskProgress};
use crate::domain::repositories::manifest_repository::ManifestRepository;
use crate::domain::repositories::storage_repository::StorageRepository;
use crate::domain::services::content_scanner;
use crate::domain::services::outcome_recorder::{OutcomeRecorder, NO_CONTENT};
use crate::engines::json_api::JsonApiClient;
use crate::engines::render_adapter::RenderAdapter;
use crate::engines::traits::{FetchRequest, Fetcher, Renderer};
use crate::infrastructure::metrics::{TASKS_TOTAL, TASK_DURATION_SECONDS};
use crate::utils::errors::PipelineError;
use crate::utils::retry_policy::RetryPolicy;
use crate::workers::governor::ConcurrencyGovernor;

/// 升级式提取流水线
///
/// 对每个URL依次尝试：静态抓取、页面内嵌JSON、页面发现的接口、浏览器渲染，
/// 在第一个得到可用结果的阶段结束。
pub struct EscalationPipeline {
    governor: ConcurrencyGovernor,
    fetcher: Arc<dyn Fetcher>,
    api_client: JsonApiClient,
    renderer: RenderAdapter,
    recorder: OutcomeRecorder,
    http: HttpSettings,
    wait_for: Option<String>,
    min_html_chars: usize,
    force_render: bool,
}

impl EscalationPipeline {
    /// 创建新的流水线
    ///
    /// # 参数
    ///
    /// * `settings` - 应用配置
    /// * `governor` - 并发控制器
    /// * `fetcher` - 页面与接口共用的抓取能力
    /// * `renderer` - 浏览器渲染能力
    /// * `storage` - 产物存储
    /// * `manifest` - 清单仓库
    pub fn new(
        settings: &Settings,
        governor: ConcurrencyGovernor,
        fetcher: Arc<dyn Fetcher>,
        renderer: Arc<dyn Renderer>,
        storage: Arc<dyn StorageRepository>,
        manifest: Arc<dyn ManifestRepository>,
    ) -> Self {
        let api_client = JsonApiClient::new(
            fetcher.clone(),
            RetryPolicy::from(&settings.api_probe),
            settings.api_probe.timeout(),
        );

        Self {
            governor,
            fetcher,
            api_client,
            renderer: RenderAdapter::new(renderer, &settings.render),
            recorder: OutcomeRecorder::new(storage, manifest, settings.output.failed_prefix_chars),
            http: settings.http.clone(),
            wait_for: settings.render.wait_for.clone(),
            min_html_chars: settings.render.min_html_chars,
            force_render: settings.pipeline.force_render,
        }
    }

    pub fn governor(&self) -> &ConcurrencyGovernor {
        &self.governor
    }

    /// 处理一个URL，返回写入清单的记录
    ///
    /// 任何错误或 panic 都会被转换为 `exception` 记录，不会向调用方传播。
    pub async fn process_url(&self, url: &str) -> ManifestRecord {
        let task = FetchTask::new(url);
        let mut progress = TaskProgress::default();

        let outcome = AssertUnwindSafe(self.run_task(&task, &mut progress))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(PipelineError::from_panic(payload)));

        let record = match outcome {
            Ok(record) => record,
            Err(e) => {
                error!(task_id = %task.id, url = %task.url, "Task failed: {}", e);
                self.record_exception(&task, &progress, &e.to_string()).await
            }
        };

        metrics::counter!(TASKS_TOTAL, "stage" => record.stage.as_str()).increment(1);
        metrics::histogram!(TASK_DURATION_SECONDS).record(record.elapsed);
        record
    }

    /// 追加一条异常记录；追加失败只记录日志
    pub async fn record_exception(
        &self,
        task: &FetchTask,
        progress: &TaskProgress,
        err: &str,
    ) -> ManifestRecord {
        let record = ManifestRecord::exception(task, progress, err);
        if let Err(e) = self.recorder.append(&record).await {
            error!("Failed to append exception record for {}: {}", task.url, e);
        }
        record
    }

    #[instrument(skip(self, task, progress), fields(task_id = %task.id, url = %task.url, domain = %task.domain))]
    async fn run_task(
        &self,
        task: &FetchTask,
        progress: &mut TaskProgress,
    ) -> Result<ManifestRecord, PipelineError> {
        let _permit = self.governor.acquire_task(&task.domain).await?;
        debug!("Acquired task permit");

        let request = FetchRequest::new(&task.url, self.http.timeout())
            .with_proxy(self.http.proxy_for(&task.url));
        let response = self.fetcher.get(&request).await?;
        progress.http_status = Some(response.status_code);
        progress.final_url = Some(response.final_url.clone());
        debug!(
            "Fetched {} bytes with status {} in {}ms",
            response.content.len(),
            response.status_code,
            response.response_time_ms
        );

        let result = if self.force_render {
            self.render_stage(task, &response.content).await?
        } else {
            match self.fast_stages(&response.content, &response.final_url).await {
                Some(result) => result,
                None => self.render_stage(task, &response.content).await?,
            }
        };

        let record = self.recorder.record(task, progress, &result).await?;
        if record.ok {
            info!(stage = %record.stage, "Task completed");
        } else {
            warn!(stage = %record.stage, err = ?record.err, "Task produced no content");
        }
        Ok(record)
    }

    /// 内嵌JSON与接口探测，均不占用渲染名额
    async fn fast_stages(&self, html: &str, final_url: &str) -> Option<ExtractionResult> {
        let ld = content_scanner::extract_ld_json(html);
        let inline = content_scanner::extract_inline_state(html);
        if !ld.is_empty() || inline.is_some() {
            debug!("Found {} ld+json blocks, inline state: {}", ld.len(), inline.is_some());
            return Some(ExtractionResult::FastJson { ld, inline });
        }

        let candidates = content_scanner::find_api_candidates(html, final_url);
        debug!("Probing {} API candidates", candidates.len());
        for endpoint in candidates {
            match self
                .api_client
                .fetch_json(&endpoint, self.http.proxy_for(&endpoint))
                .await
            {
                Ok(payload) if is_usable_json(&payload) => {
                    return Some(ExtractionResult::ApiJson { endpoint, payload });
                }
                Ok(_) => debug!("API {} returned an empty payload", endpoint),
                Err(e) => debug!("Skipping API {}: {}", endpoint, e),
            }
        }

        None
    }

    /// 占用渲染名额进行浏览器渲染，结果不足时返回失败结果
    async fn render_stage(
        &self,
        task: &FetchTask,
        fetched_html: &str,
    ) -> Result<ExtractionResult, PipelineError> {
        let response = {
            let _heavy = self.governor.acquire_heavy().await?;
            debug!("Acquired render permit");
            self.renderer
                .render(&task.url, self.wait_for.as_deref())
                .await
        };

        let rendered_chars = response.html.chars().count();
        if response.success && rendered_chars > self.min_html_chars {
            return Ok(ExtractionResult::RenderedPage {
                html: response.html,
                screenshot: response.screenshot,
            });
        }

        let reason = match response.error_message {
            Some(reason) if !response.success => reason,
            _ => NO_CONTENT.to_string(),
        };
        debug!(
            "Render unusable ({} chars, success: {}): {}",
            rendered_chars, response.success, reason
        );
        Ok(ExtractionResult::Failure {
            reason,
            diagnostic_html: fetched_html.to_string(),
        })
    }
}
