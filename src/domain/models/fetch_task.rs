// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use std::time::Instant;
use uuid::Uuid;

use crate::utils::url_utils;

/// 抓取任务
///
/// 每个被派发的URL对应一个任务，只在一次流水线调用内存活，不做持久化。
#[derive(Debug, Clone)]
pub struct FetchTask {
    /// 任务唯一标识符，仅用于日志关联
    pub id: Uuid,
    /// 目标URL
    pub url: String,
    /// 网络位置（host[:port]），决定所使用的域名限流器
    pub domain: String,
    /// 派发时间
    pub started_at: DateTime<Utc>,
    started: Instant,
}

impl FetchTask {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let domain = url_utils::domain_of(&url);
        Self {
            id: Uuid::new_v4(),
            url,
            domain,
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    /// 自派发以来经过的秒数
    pub fn elapsed_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }
}
