// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::RenderSettings;
use crate::engines::traits::{EngineError, RenderRequest, RenderResponse, Renderer};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::cdp::browser_protocol::target::{CreateBrowserContextParams, CreateTargetParams};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// 等待选择器出现时的轮询间隔
const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Chromium渲染引擎
///
/// 基于chromiumoxide实现。每次渲染都在独立的浏览器上下文中进行，本地模式下还会为每次调用
/// 启动一个新的浏览器进程，调用结束或被取消时关闭。
pub struct ChromiumEngine {
    headless: bool,
    remote_debugging_url: Option<String>,
}

impl ChromiumEngine {
    pub fn new(headless: bool, remote_debugging_url: Option<String>) -> Self {
        Self {
            headless,
            remote_debugging_url,
        }
    }

    pub fn from_settings(settings: &RenderSettings) -> Self {
        Self::new(settings.headless, settings.remote_debugging_url.clone())
    }

    /// 启动或连接浏览器，并启动事件处理任务
    async fn open_browser(
        &self,
        request_timeout: Duration,
    ) -> Result<(Browser, JoinHandle<()>), EngineError> {
        let (browser, mut handler) = if let Some(ref url) = self.remote_debugging_url {
            debug!("Connecting to remote Chrome instance at: {}", url);
            Browser::connect(url).await.map_err(|e| {
                EngineError::Browser(format!("Failed to connect to remote Chrome: {}", e))
            })?
        } else {
            let mut builder = BrowserConfig::builder()
                .no_sandbox()
                .request_timeout(request_timeout)
                .arg("--disable-gpu")
                .arg("--disable-dev-shm-usage");
            if !self.headless {
                builder = builder.with_head();
            }

            Browser::launch(builder.build().map_err(EngineError::Browser)?)
                .await
                .map_err(|e| EngineError::Browser(format!("Failed to launch Chrome: {}", e)))?
        };

        // Spawn a handler to process browser events
        let handle = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        Ok((browser, handle))
    }

    async fn render_page(
        page: &Page,
        request: &RenderRequest,
    ) -> Result<RenderResponse, EngineError> {
        tokio::time::timeout(request.page_timeout, async {
            page.goto(&request.url)
                .await
                .map_err(|e| EngineError::Browser(format!("Navigation failed: {}", e)))?;

            if let Some(selector) = &request.wait_for {
                wait_for_selector(page, selector).await?;
            }
            Ok::<(), EngineError>(())
        })
        .await
        .map_err(|_| EngineError::Timeout)??;

        for (i, script) in request.js_code.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(request.scroll_delay).await;
            }
            page.evaluate(script.as_str())
                .await
                .map_err(|e| EngineError::Browser(format!("Script failed: {}", e)))?;
        }

        tokio::time::sleep(request.settle_delay).await;

        let html = page
            .content()
            .await
            .map_err(|e| EngineError::Browser(e.to_string()))?;

        let screenshot = if request.capture_screenshot {
            let params = ScreenshotParams::builder()
                .format(CaptureScreenshotFormat::Png)
                .full_page(true)
                .build();
            match page.screenshot(params).await {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    warn!("Page screenshot failed for {}: {}", request.url, e);
                    None
                }
            }
        } else {
            None
        };

        Ok(RenderResponse {
            success: true,
            html,
            screenshot,
            error_message: None,
        })
    }
}

/// 轮询直到选择器匹配到元素；由外层超时终止
async fn wait_for_selector(page: &Page, selector: &str) -> Result<(), EngineError> {
    let started = Instant::now();
    loop {
        if page.find_element(selector).await.is_ok() {
            debug!(
                "Selector {:?} matched after {:?}",
                selector,
                started.elapsed()
            );
            return Ok(());
        }
        tokio::time::sleep(SELECTOR_POLL_INTERVAL).await;
    }
}

/// 一次渲染占用的浏览器资源
///
/// 正常结束时由 `close` 依次释放上下文、浏览器进程和事件处理任务。渲染被外层超时取消时，
/// `Drop` 把同样的清理交给后台任务完成，远程浏览器中不会残留上下文和标签页。
struct BrowserSession {
    browser: Option<Browser>,
    handler: Option<JoinHandle<()>>,
    context_id: Option<BrowserContextId>,
    launched: bool,
}

impl BrowserSession {
    fn new(browser: Browser, handler: JoinHandle<()>, launched: bool) -> Self {
        Self {
            browser: Some(browser),
            handler: Some(handler),
            context_id: None,
            launched,
        }
    }

    async fn close(mut self) {
        if let Some(browser) = self.browser.take() {
            shutdown(browser, self.context_id.take(), self.handler.take(), self.launched).await;
        }
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        let Some(browser) = self.browser.take() else {
            return;
        };
        let context_id = self.context_id.take();
        let handler = self.handler.take();

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                debug!("Render cancelled, releasing browser resources in background");
                runtime.spawn(shutdown(browser, context_id, handler, self.launched));
            }
            Err(_) => {
                if let Some(handler) = handler {
                    handler.abort();
                }
            }
        }
    }
}

/// 释放上下文，关闭自己启动的浏览器进程，最后停止事件处理任务
async fn shutdown(
    mut browser: Browser,
    context_id: Option<BrowserContextId>,
    handler: Option<JoinHandle<()>>,
    launched: bool,
) {
    if let Some(context_id) = context_id {
        if let Err(e) = browser.dispose_browser_context(context_id).await {
            debug!("Failed to dispose browser context: {}", e);
        }
    }

    // 远程浏览器由外部管理，只关闭自己启动的进程
    if launched {
        if let Err(e) = browser.close().await {
            debug!("Failed to close browser: {}", e);
        }
        let _ = browser.wait().await;
    }

    if let Some(handler) = handler {
        handler.abort();
    }
}

/// 在会话中创建隔离的上下文和页面并渲染
async fn render_in_session(
    session: &mut BrowserSession,
    request: &RenderRequest,
) -> Result<RenderResponse, EngineError> {
    let browser = session
        .browser
        .as_mut()
        .ok_or_else(|| EngineError::Browser("Browser already closed".to_string()))?;

    let context_id = browser
        .create_browser_context(CreateBrowserContextParams::default())
        .await
        .map_err(|e| EngineError::Browser(format!("Failed to create context: {}", e)))?;
    session.context_id = Some(context_id.clone());

    let target = CreateTargetParams::builder()
        .url("about:blank")
        .browser_context_id(context_id)
        .build()
        .map_err(EngineError::Browser)?;
    let page = browser
        .new_page(target)
        .await
        .map_err(|e| EngineError::Browser(e.to_string()))?;

    let result = ChromiumEngine::render_page(&page, request).await;
    let _ = page.close().await;
    result
}

#[async_trait]
impl Renderer for ChromiumEngine {
    /// 渲染页面
    ///
    /// # 参数
    ///
    /// * `request` - 渲染请求
    ///
    /// # 返回值
    ///
    /// * `Ok(RenderResponse)` - 渲染结果
    /// * `Err(EngineError)` - 浏览器错误，页面加载或等待选择器超时返回 `EngineError::Timeout`
    async fn render(&self, request: &RenderRequest) -> Result<RenderResponse, EngineError> {
        let (browser, handler) = self.open_browser(request.page_timeout).await?;
        let mut session =
            BrowserSession::new(browser, handler, self.remote_debugging_url.is_none());

        let result = render_in_session(&mut session, request).await;
        session.close().await;

        if result.is_ok() {
            info!("Rendered {}", request.url);
        }
        result
    }

    /// 获取引擎名称
    fn name(&self) -> &'static str {
        "chromium"
    }
}
