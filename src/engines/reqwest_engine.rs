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

use crate::engines::traits::{EngineError, FetchRequest, FetchResponse, Fetcher};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::time::Instant;

/// 抓取引擎
///
/// 基于reqwest实现的HTTP抓取引擎。无代理请求共享同一个客户端，带代理的请求单独构建客户端。
pub struct ReqwestEngine {
    client: reqwest::Client,
    user_agent: String,
}

impl ReqwestEngine {
    /// 创建新的抓取引擎
    ///
    /// # 参数
    ///
    /// * `user_agent` - 所有请求使用的 User-Agent
    pub fn new(user_agent: impl Into<String>) -> Result<Self, EngineError> {
        let user_agent = user_agent.into();
        let client = Self::builder(&user_agent).build()?;
        Ok(Self { client, user_agent })
    }

    fn builder(user_agent: &str) -> reqwest::ClientBuilder {
        reqwest::Client::builder()
            .user_agent(user_agent)
            .cookie_store(true)
    }

    fn client_for(&self, request: &FetchRequest) -> Result<reqwest::Client, EngineError> {
        match &request.proxy {
            Some(proxy_url) => {
                let proxy = reqwest::Proxy::all(proxy_url)
                    .map_err(|e| EngineError::Other(format!("Invalid proxy: {}", e)))?;
                Ok(Self::builder(&self.user_agent).proxy(proxy).build()?)
            }
            None => Ok(self.client.clone()),
        }
    }
}

#[async_trait]
impl Fetcher for ReqwestEngine {
    /// 执行HTTP GET
    ///
    /// # 参数
    ///
    /// * `request` - 抓取请求
    ///
    /// # 返回值
    ///
    /// * `Ok(FetchResponse)` - 抓取响应（含非2xx状态）
    /// * `Err(EngineError)` - 传输层错误，超时映射为 `EngineError::Timeout`
    async fn get(&self, request: &FetchRequest) -> Result<FetchResponse, EngineError> {
        // Build headers
        let mut headers = HeaderMap::new();
        for (k, v) in &request.headers {
            if let (Ok(k), Ok(v)) = (
                HeaderName::from_bytes(k.as_bytes()),
                HeaderValue::from_str(v),
            ) {
                headers.insert(k, v);
            }
        }

        let client = self.client_for(request)?;

        let start = Instant::now();
        let response = client
            .get(&request.url)
            .headers(headers)
            .timeout(request.timeout)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status_code = response.status().as_u16();
        let final_url = response.url().to_string();
        let content = response.text().await.map_err(map_transport_error)?;

        Ok(FetchResponse {
            status_code,
            content,
            final_url,
            response_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// 获取引擎名称
    fn name(&self) -> &'static str {
        "reqwest"
    }
}

fn map_transport_error(e: reqwest::Error) -> EngineError {
    if e.is_timeout() {
        EngineError::Timeout
    } else {
        EngineError::RequestFailed(e)
    }
}

#[cfg(test)]
#[path = "reqwest_engine_test.rs"]
mod tests;
