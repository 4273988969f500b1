// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::models::extraction::Stage;
use crate::domain::models::fetch_task::FetchTask;

/// 清单记录
///
/// 每个任务恰好一条，写入后不再修改。序列化为一行JSON。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestRecord {
    /// 输入URL
    pub url: String,
    /// 重定向后的最终URL
    #[serde(default)]
    pub final_url: Option<String>,
    /// 初次抓取的HTTP状态码
    #[serde(default)]
    pub http_status: Option<u16>,
    /// 终态
    pub stage: Stage,
    /// 是否成功
    pub ok: bool,
    /// 产物路径
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// 错误描述
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
    /// 命中的API地址（仅 fast-api）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api: Option<String>,
    /// 任务开始时间
    pub started_at: DateTime<Utc>,
    /// 耗时（秒）
    pub elapsed: f64,
}

impl ManifestRecord {
    /// 以异常终态创建一条记录，抓取阶段已得到的状态码和最终URL会被保留
    pub fn exception(task: &FetchTask, progress: &TaskProgress, err: impl Into<String>) -> Self {
        let mut err = err.into();
        if err.trim().is_empty() {
            err = "unknown error".to_string();
        }
        Self {
            url: task.url.clone(),
            final_url: progress.final_url.clone(),
            http_status: progress.http_status,
            stage: Stage::Exception,
            ok: false,
            path: None,
            err: Some(err),
            api: None,
            started_at: task.started_at,
            elapsed: task.elapsed_secs(),
        }
    }

    /// 序列化为不含换行的单行JSON
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// 任务执行过程中逐步收集的信息
#[derive(Debug, Clone, Default)]
pub struct TaskProgress {
    pub http_status: Option<u16>,
    pub final_url: Option<String>,
}
