// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::models::manifest::ManifestRecord;

/// 清单错误类型
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// 清单仓库特质
///
/// 只追加，记录一经写入不会被修改或删除。实现必须保证每条记录作为完整的一行写入；
/// 整行写入成功即视为提交，之后的刷盘失败只记录日志，不再返回错误。
#[async_trait]
pub trait ManifestRepository: Send + Sync {
    /// 追加一条记录
    async fn append(&self, record: &ManifestRecord) -> Result<(), ManifestError>;
}
