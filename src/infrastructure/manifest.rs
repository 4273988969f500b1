// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::warn;

use crate::domain::models::manifest::ManifestRecord;
use crate::domain::repositories::manifest_repository::{ManifestError, ManifestRepository};

/// JSONL 清单文件
///
/// 以追加模式打开，多次运行的记录会累积在同一个文件中。所有任务共享一个写入句柄，
/// 互斥锁保证行与行之间不会交错。
pub struct JsonlManifest {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlManifest {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ManifestRepository for JsonlManifest {
    async fn append(&self, record: &ManifestRecord) -> Result<(), ManifestError> {
        let line = record.to_line()?;

        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes()).await?;

        // The line is committed once written; pipes and FIFOs reject fsync
        if let Err(e) = file.flush().await {
            warn!("Failed to flush manifest {}: {}", self.path.display(), e);
        } else if let Err(e) = file.sync_data().await {
            warn!("Failed to sync manifest {}: {}", self.path.display(), e);
        }

        Ok(())
    }
}

/// 内存清单（用于测试）
#[derive(Clone, Default)]
pub struct InMemoryManifest {
    records: Arc<RwLock<Vec<ManifestRecord>>>,
}

impl InMemoryManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前所有记录的快照
    pub async fn records(&self) -> Vec<ManifestRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl ManifestRepository for InMemoryManifest {
    async fn append(&self, record: &ManifestRecord) -> Result<(), ManifestError> {
        self.records.write().await.push(record.clone());
        Ok(())
    }
}
