// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::config::settings::RenderSettings;
use crate::engines::traits::{RenderRequest, RenderResponse, Renderer};
use crate::utils::errors::panic_message;

/// 渐进滚动脚本：先滚到三分之一处，再滚到底部
pub const SCROLL_SCRIPT: [&str; 2] = [
    "(()=>{window.scrollTo(0,document.body.scrollHeight/3);return true})()",
    "(()=>{window.scrollTo(0,document.body.scrollHeight);return true})()",
];

/// 浏览器启动和内容读取等步骤在页面超时之外的额外时间
const RENDER_GRACE: Duration = Duration::from_secs(15);

/// 渲染适配器
///
/// 为渲染能力提供固定的滚动脚本和时间参数，并把所有错误、panic 和超时降级为失败的渲染结果。
pub struct RenderAdapter {
    renderer: Arc<dyn Renderer>,
    page_timeout: Duration,
    settle_delay: Duration,
    scroll_delay: Duration,
    capture_screenshot: bool,
}

impl RenderAdapter {
    pub fn new(renderer: Arc<dyn Renderer>, settings: &RenderSettings) -> Self {
        Self {
            renderer,
            page_timeout: settings.page_timeout(),
            settle_delay: settings.settle_delay(),
            scroll_delay: settings.scroll_delay(),
            capture_screenshot: settings.capture_screenshot,
        }
    }

    /// 构造渲染请求
    pub fn request_for(&self, url: &str, wait_for: Option<&str>) -> RenderRequest {
        RenderRequest {
            url: url.to_string(),
            wait_for: wait_for.map(str::to_string),
            js_code: SCROLL_SCRIPT.iter().map(|s| s.to_string()).collect(),
            page_timeout: self.page_timeout,
            settle_delay: self.settle_delay,
            scroll_delay: self.scroll_delay,
            capture_screenshot: self.capture_screenshot,
        }
    }

    /// 单次渲染的总时限
    pub fn deadline(&self) -> Duration {
        self.page_timeout + self.settle_delay + self.scroll_delay * 2 + RENDER_GRACE
    }

    /// 渲染页面，从不返回错误
    ///
    /// # 参数
    ///
    /// * `url` - 目标URL
    /// * `wait_for` - 等待条件（CSS选择器）
    ///
    /// # 返回值
    ///
    /// 渲染结果，失败时 `success` 为 false 且 `error_message` 给出原因
    pub async fn render(&self, url: &str, wait_for: Option<&str>) -> RenderResponse {
        let request = self.request_for(url, wait_for);

        let rendering = AssertUnwindSafe(self.renderer.render(&request)).catch_unwind();

        match tokio::time::timeout(self.deadline(), rendering).await {
            Ok(Ok(Ok(response))) if response.success => response,
            Ok(Ok(Ok(mut response))) => {
                if response.error_message.is_none() {
                    response.error_message = Some("render reported failure".to_string());
                }
                response
            }
            Ok(Ok(Err(e))) => {
                warn!("Renderer {} failed for {}: {}", self.renderer.name(), url, e);
                RenderResponse::failed(e.to_string())
            }
            Ok(Err(payload)) => {
                let message = panic_message(payload.as_ref());
                warn!("Renderer {} panicked for {}: {}", self.renderer.name(), url, message);
                RenderResponse::failed(format!("renderer panicked: {}", message))
            }
            Err(_) => {
                warn!("Renderer {} timed out for {}", self.renderer.name(), url);
                RenderResponse::failed("render timed out")
            }
        }
    }
}
