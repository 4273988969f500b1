// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::domain::models::extraction::ExtractionResult;
use crate::domain::models::fetch_task::FetchTask;
use crate::domain::models::manifest::{ManifestRecord, TaskProgress};
use crate::domain::repositories::manifest_repository::{ManifestError, ManifestRepository};
use crate::domain::repositories::storage_repository::{StorageError, StorageRepository};
use crate::utils::errors::PipelineError;
use crate::utils::url_utils;

/// 失败且没有渲染错误描述时使用的原因
pub const NO_CONTENT: &str = "no content";

/// 结果记录服务
///
/// 先写产物，再追加清单。两步之间崩溃会留下没有清单记录的产物文件，下次运行会覆盖它。
pub struct OutcomeRecorder {
    storage: Arc<dyn StorageRepository>,
    manifest: Arc<dyn ManifestRepository>,
    failed_prefix_chars: usize,
}

impl OutcomeRecorder {
    /// 创建新的记录服务
    ///
    /// # 参数
    ///
    /// * `storage` - 产物存储
    /// * `manifest` - 清单仓库
    /// * `failed_prefix_chars` - 失败诊断文件保留的HTML字符数
    pub fn new(
        storage: Arc<dyn StorageRepository>,
        manifest: Arc<dyn ManifestRepository>,
        failed_prefix_chars: usize,
    ) -> Self {
        Self {
            storage,
            manifest,
            failed_prefix_chars,
        }
    }

    /// 产物的存储键：`<域名>/<文件名>.<扩展名>`，失败诊断文件带 `failed_` 前缀
    pub fn artifact_key(task: &FetchTask, ext: &str, failed: bool) -> String {
        let dir = match url_utils::sanitize(&task.domain) {
            d if d.is_empty() => "unknown".to_string(),
            d => d,
        };
        let stem = url_utils::safe_file_stem(&task.url);
        if failed {
            format!("{}/failed_{}.{}", dir, stem, ext)
        } else {
            format!("{}/{}.{}", dir, stem, ext)
        }
    }

    /// 写入结果对应的产物，返回产物位置
    ///
    /// # 参数
    ///
    /// * `task` - 抓取任务
    /// * `result` - 提取结果
    ///
    /// # 返回值
    ///
    /// * `Ok(String)` - 主产物的完整位置（截图与主产物同名，扩展名为 `.png`）
    /// * `Err(StorageError)` - 写入失败
    pub async fn write_artifact(
        &self,
        task: &FetchTask,
        result: &ExtractionResult,
    ) -> Result<String, StorageError> {
        let location = match result {
            ExtractionResult::FastJson { ld, inline } => {
                let body = json!({ "ld": ld, "inline": inline });
                let bytes = serde_json::to_vec_pretty(&body)
                    .map_err(|e| StorageError::Other(e.to_string()))?;
                self.storage
                    .save(&Self::artifact_key(task, "json", false), &bytes)
                    .await?
            }
            ExtractionResult::ApiJson { payload, .. } => {
                let body = json!({ "api": payload });
                let bytes = serde_json::to_vec_pretty(&body)
                    .map_err(|e| StorageError::Other(e.to_string()))?;
                self.storage
                    .save(&Self::artifact_key(task, "json", false), &bytes)
                    .await?
            }
            ExtractionResult::RenderedPage { html, screenshot } => {
                let location = self
                    .storage
                    .save(&Self::artifact_key(task, "html", false), html.as_bytes())
                    .await?;
                if let Some(png) = screenshot {
                    let key = Self::artifact_key(task, "png", false);
                    if let Err(e) = self.storage.save(&key, png).await {
                        warn!("Failed to save screenshot {}: {}", key, e);
                    }
                }
                location
            }
            ExtractionResult::Failure {
                diagnostic_html, ..
            } => {
                let prefix: String = diagnostic_html
                    .chars()
                    .take(self.failed_prefix_chars)
                    .collect();
                self.storage
                    .save(&Self::artifact_key(task, "html", true), prefix.as_bytes())
                    .await?
            }
        };

        debug!("Artifact written to {}", location);
        Ok(location)
    }

    /// 追加一条清单记录
    pub async fn append(&self, record: &ManifestRecord) -> Result<(), ManifestError> {
        self.manifest.append(record).await
    }

    /// 根据提取结果构造最终的清单记录
    pub fn build_record(
        task: &FetchTask,
        progress: &TaskProgress,
        result: &ExtractionResult,
        path: String,
    ) -> ManifestRecord {
        let (api, err) = match result {
            ExtractionResult::ApiJson { endpoint, .. } => (Some(endpoint.clone()), None),
            ExtractionResult::Failure { reason, .. } => {
                let reason = if reason.trim().is_empty() {
                    NO_CONTENT.to_string()
                } else {
                    reason.clone()
                };
                (None, Some(reason))
            }
            _ => (None, None),
        };

        ManifestRecord {
            url: task.url.clone(),
            final_url: progress.final_url.clone(),
            http_status: progress.http_status,
            stage: result.stage(),
            ok: result.is_success(),
            path: Some(path),
            err,
            api,
            started_at: task.started_at,
            elapsed: task.elapsed_secs(),
        }
    }

    /// 写入产物并追加记录
    ///
    /// 只有产物写入失败会返回错误。追加失败时记录可能已经部分或全部写入清单，
    /// 再补一条 `exception` 记录会让同一个任务出现两条记录，所以只记录日志并照常返回。
    pub async fn record(
        &self,
        task: &FetchTask,
        progress: &TaskProgress,
        result: &ExtractionResult,
    ) -> Result<ManifestRecord, PipelineError> {
        let path = self.write_artifact(task, result).await?;
        let record = Self::build_record(task, progress, result, path);
        if let Err(e) = self.append(&record).await {
            error!("Failed to append manifest record for {}: {}", task.url, e);
        }
        Ok(record)
    }
}

#[cfg(test)]
#[path = "outcome_recorder_test.rs"]
mod tests;
