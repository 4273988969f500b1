// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use futures::FutureExt;
use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::domain::models::extraction::Stage;
use crate::domain::models::fetch_task::FetchTask;
use crate::domain::models::manifest::{ManifestRecord, TaskProgress};
use crate::utils::errors::PipelineError;
use crate::workers::pipeline::EscalationPipeline;

/// 一次运行的汇总
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub total: usize,
    pub ok: usize,
    pub by_stage: HashMap<Stage, usize>,
}

impl RunSummary {
    fn add(&mut self, record: &ManifestRecord) {
        self.total += 1;
        if record.ok {
            self.ok += 1;
        }
        *self.by_stage.entry(record.stage).or_insert(0) += 1;
    }

    pub fn count(&self, stage: Stage) -> usize {
        self.by_stage.get(&stage).copied().unwrap_or(0)
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "total={} ok={}", self.total, self.ok)?;
        for stage in [
            Stage::FastJson,
            Stage::FastApi,
            Stage::Heavy,
            Stage::Failed,
            Stage::Exception,
        ] {
            write!(f, " {}={}", stage, self.count(stage))?;
        }
        Ok(())
    }
}

/// 读取URL列表文件，每行一个URL，忽略空行
pub async fn read_url_list(path: &Path) -> Result<Vec<String>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read URL list {}", path.display()))?;

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// 为每个URL派发一个任务并等待全部完成
///
/// 任务之间没有顺序保证。单个任务的失败或 panic 只影响它自己的清单记录。
pub async fn run_urls(pipeline: Arc<EscalationPipeline>, urls: Vec<String>) -> RunSummary {
    info!("Dispatching {} URLs", urls.len());

    let mut set = JoinSet::new();
    for url in urls {
        let pipeline = pipeline.clone();
        set.spawn(async move {
            match AssertUnwindSafe(pipeline.process_url(&url))
                .catch_unwind()
                .await
            {
                Ok(record) => record,
                Err(payload) => {
                    let err = PipelineError::from_panic(payload);
                    error!("Task for {} panicked: {}", url, err);
                    let task = FetchTask::new(url);
                    pipeline
                        .record_exception(&task, &TaskProgress::default(), &err.to_string())
                        .await
                }
            }
        });
    }

    let mut summary = RunSummary::default();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(record) => summary.add(&record),
            Err(e) => error!("Task join error: {}", e),
        }
    }

    info!("Run finished: {}", summary);
    summary
}
