// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use thiserror::Error;

/// 存储错误类型
#[derive(Error, Debug)]
pub enum StorageError {
    /// IO错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// 非法的存储键
    #[error("Invalid storage key: {0}")]
    InvalidKey(String),
    /// 存储错误
    #[error("Storage error: {0}")]
    Other(String),
}

/// 存储仓库特质
///
/// 定义产物文件的存取接口，键是相对于存储根目录的路径（如 `example.com/page_0123456789.json`）。
/// 流水线只调用 `save`；`get` 与 `exists` 供测试和离线检查产物使用。
#[async_trait]
pub trait StorageRepository: Send + Sync {
    /// 使用指定键保存数据，已存在时覆盖，返回产物的完整位置
    async fn save(&self, key: &str, data: &[u8]) -> Result<String, StorageError>;

    /// 根据键从存储中检索数据
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// 检查存储中是否存在指定键
    async fn exists(&self, key: &str) -> Result<bool, StorageError>;
}
