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

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// 引擎错误类型
#[derive(Error, Debug)]
pub enum EngineError {
    /// 请求失败
    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    /// 超时
    #[error("Timeout")]
    Timeout,
    /// 响应体不是可用的JSON
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),
    /// 浏览器错误
    #[error("Browser error: {0}")]
    Browser(String),
    /// 其他错误
    #[error("Other error: {0}")]
    Other(String),
}

/// 抓取请求
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// 目标URL
    pub url: String,
    /// 请求头
    pub headers: HashMap<String, String>,
    /// 超时时间
    pub timeout: Duration,
    /// 代理配置 (URL)
    pub proxy: Option<String>,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::new(),
            timeout,
            proxy: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }
}

/// 抓取响应
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// HTTP状态码
    pub status_code: u16,
    /// 响应内容
    pub content: String,
    /// 重定向后的最终URL
    pub final_url: String,
    /// 响应时间（毫秒）
    pub response_time_ms: u64,
}

/// HTTP抓取能力
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// 执行GET请求，非2xx状态码作为正常响应返回
    async fn get(&self, request: &FetchRequest) -> Result<FetchResponse, EngineError>;

    /// 引擎名称
    fn name(&self) -> &'static str;
}

/// 渲染请求
#[derive(Debug, Clone)]
pub struct RenderRequest {
    /// 目标URL
    pub url: String,
    /// 等待出现的CSS选择器
    pub wait_for: Option<String>,
    /// 页面加载后执行的脚本，按顺序执行
    pub js_code: Vec<String>,
    /// 页面加载超时
    pub page_timeout: Duration,
    /// 脚本执行完毕后读取内容前的等待时间
    pub settle_delay: Duration,
    /// 两段脚本之间的间隔
    pub scroll_delay: Duration,
    /// 是否截图
    pub capture_screenshot: bool,
}

/// 渲染响应
#[derive(Debug, Clone, Default)]
pub struct RenderResponse {
    /// 是否成功
    pub success: bool,
    /// 渲染后的HTML
    pub html: String,
    /// PNG截图
    pub screenshot: Option<Vec<u8>>,
    /// 失败原因
    pub error_message: Option<String>,
}

impl RenderResponse {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            error_message: Some(reason.into()),
            ..Default::default()
        }
    }
}

/// 浏览器渲染能力
#[async_trait]
pub trait Renderer: Send + Sync {
    /// 渲染页面
    async fn render(&self, request: &RenderRequest) -> Result<RenderResponse, EngineError>;

    /// 引擎名称
    fn name(&self) -> &'static str;
}
