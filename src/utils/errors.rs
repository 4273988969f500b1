// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use thiserror::Error;

use crate::domain::repositories::storage_repository::StorageError;
use crate::engines::traits::EngineError;
use crate::workers::governor::GovernorError;

/// 流水线错误类型
///
/// 任何一种都会让任务以 `exception` 结束，错误描述写入清单的 `err` 字段。
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("fetch failed: {0}")]
    Engine(#[from] EngineError),

    #[error("storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("{0}")]
    Governor(#[from] GovernorError),

    #[error("task panicked: {0}")]
    Panic(String),
}

impl PipelineError {
    /// 从 panic 负载中提取可读信息
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        PipelineError::Panic(panic_message(payload.as_ref()))
    }
}

/// panic 负载的文本内容，非字符串负载返回 "unknown panic"
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
