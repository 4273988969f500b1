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

use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::settings::ConcurrencySettings;
use crate::infrastructure::metrics::HEAVY_IN_FLIGHT;

/// 并发控制错误
#[derive(Error, Debug)]
pub enum GovernorError {
    /// 信号量已关闭
    #[error("Concurrency limiter closed: {0}")]
    Closed(&'static str),
}

/// 任务级许可，持有期间占用一个域名名额和一个全局名额
#[derive(Debug)]
pub struct TaskPermit {
    _global: OwnedSemaphorePermit,
    _domain: OwnedSemaphorePermit,
}

/// 渲染许可，仅在渲染阶段持有
#[derive(Debug)]
pub struct HeavyPermit {
    _permit: OwnedSemaphorePermit,
}

impl Drop for HeavyPermit {
    fn drop(&mut self) {
        metrics::gauge!(HEAVY_IN_FLIGHT).decrement(1.0);
    }
}

/// 并发控制器
///
/// 三级计数信号量：全局、按域名、渲染。域名信号量按需创建，创建后不再移除。
#[derive(Clone, Debug)]
pub struct ConcurrencyGovernor {
    global: Arc<Semaphore>,
    heavy: Arc<Semaphore>,
    /// 存储每个域名的信号量
    domains: Arc<DashMap<String, Arc<Semaphore>>>,
    per_domain: usize,
}

impl ConcurrencyGovernor {
    /// 创建一个新的并发控制器
    ///
    /// # 参数
    ///
    /// * `global` - 全局并发上限
    /// * `per_domain` - 单域名并发上限
    /// * `heavy` - 同时进行的渲染上限
    pub fn new(global: usize, per_domain: usize, heavy: usize) -> Self {
        Self {
            global: Arc::new(Semaphore::new(global)),
            heavy: Arc::new(Semaphore::new(heavy)),
            domains: Arc::new(DashMap::new()),
            per_domain,
        }
    }

    pub fn from_settings(settings: &ConcurrencySettings) -> Self {
        Self::new(settings.global, settings.per_domain, settings.heavy)
    }

    /// 获取任务许可，先域名后全局
    ///
    /// # 参数
    ///
    /// * `domain` - 任务所属的网络位置
    ///
    /// # 返回值
    ///
    /// * `Ok(TaskPermit)` - 任务许可，释放时归还两个名额
    /// * `Err(GovernorError)` - 信号量已关闭
    pub async fn acquire_task(&self, domain: &str) -> Result<TaskPermit, GovernorError> {
        let domain_permit = self
            .get_or_create(domain)
            .acquire_owned()
            .await
            .map_err(|_| GovernorError::Closed("domain"))?;
        let global_permit = self
            .global
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| GovernorError::Closed("global"))?;

        Ok(TaskPermit {
            _global: global_permit,
            _domain: domain_permit,
        })
    }

    /// 获取渲染许可
    pub async fn acquire_heavy(&self) -> Result<HeavyPermit, GovernorError> {
        let permit = self
            .heavy
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| GovernorError::Closed("heavy"))?;
        metrics::gauge!(HEAVY_IN_FLIGHT).increment(1.0);
        Ok(HeavyPermit { _permit: permit })
    }

    /// 获取或创建指定域名的信号量
    fn get_or_create(&self, domain: &str) -> Arc<Semaphore> {
        self.domains
            .entry(domain.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.per_domain)))
            .clone()
    }

    pub fn global_available(&self) -> usize {
        self.global.available_permits()
    }

    pub fn heavy_available(&self) -> usize {
        self.heavy.available_permits()
    }

    /// 指定域名的剩余名额，未见过的域名返回完整上限
    pub fn domain_available(&self, domain: &str) -> usize {
        self.domains
            .get(domain)
            .map(|s| s.available_permits())
            .unwrap_or(self.per_domain)
    }

    pub fn tracked_domains(&self) -> usize {
        self.domains.len()
    }
}
