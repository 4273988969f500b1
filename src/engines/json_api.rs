// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::engines::traits::{EngineError, FetchRequest, Fetcher};
use crate::infrastructure::metrics::API_PROBE_ATTEMPTS_TOTAL;
use crate::utils::retry_policy::RetryPolicy;

/// 接口请求使用的 Accept 头
pub const JSON_ACCEPT: &str = "application/json, text/javascript, */*; q=0.01";

static JSONP_HEAD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^(]*\(\s*").expect("jsonp head pattern is valid"));
static JSONP_TAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\)\s*;?$").expect("jsonp tail pattern is valid"));

/// 去掉 JSONP 包装 `callback( ... );`
pub fn unwrap_jsonp(body: &str) -> String {
    let body = body.trim();
    let head_stripped = JSONP_HEAD.replace(body, "");
    JSONP_TAIL.replace(&head_stripped, "").into_owned()
}

/// 将响应体解析为JSON，失败时按 JSONP 解包后再试一次
pub fn parse_json_body(body: &str) -> Result<Value, EngineError> {
    match serde_json::from_str(body) {
        Ok(value) => Ok(value),
        Err(_) => serde_json::from_str(&unwrap_jsonp(body))
            .map_err(|e| EngineError::InvalidJson(e.to_string())),
    }
}

/// JSON接口客户端
///
/// 在抓取能力之上增加 JSON Accept 头、独立的超时以及指数退避重试。
/// 传输错误和解析错误都会触发重试。
pub struct JsonApiClient {
    fetcher: Arc<dyn Fetcher>,
    policy: RetryPolicy,
    timeout: Duration,
}

impl JsonApiClient {
    pub fn new(fetcher: Arc<dyn Fetcher>, policy: RetryPolicy, timeout: Duration) -> Self {
        Self {
            fetcher,
            policy,
            timeout,
        }
    }

    /// 获取并解析一个接口
    ///
    /// # 参数
    ///
    /// * `url` - 接口地址
    /// * `proxy` - 使用的代理
    ///
    /// # 返回值
    ///
    /// * `Ok(Value)` - 解析后的数据（可能为空值，由调用方判断是否可用）
    /// * `Err(EngineError)` - 重试耗尽后的最后一个错误
    pub async fn fetch_json(&self, url: &str, proxy: Option<String>) -> Result<Value, EngineError> {
        let request = FetchRequest::new(url, self.timeout)
            .with_header("Accept", JSON_ACCEPT)
            .with_proxy(proxy);

        let mut attempt = 0;
        loop {
            attempt += 1;
            metrics::counter!(API_PROBE_ATTEMPTS_TOTAL).increment(1);

            let result = match self.fetcher.get(&request).await {
                Ok(response) => parse_json_body(&response.content),
                Err(e) => Err(e),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) if self.policy.should_retry(attempt) => {
                    let backoff = self.policy.calculate_backoff(attempt);
                    debug!(
                        "API attempt {}/{} for {} failed: {}, retrying in {:?}",
                        attempt, self.policy.max_attempts, url, e, backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    warn!("API {} failed after {} attempts: {}", url, attempt, e);
                    return Err(e);
                }
            }
        }
    }
}
