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

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use validator::{Validate, ValidationError};

/// 默认的"列表页"等待条件
pub const DEFAULT_WAIT_FOR: &str = ".product, .product-card, .product-item, .search-result, ul > li";

/// 默认桌面浏览器 User-Agent
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120 Safari/537.36";

/// 应用程序配置设置
///
/// 包含并发、HTTP、API探测、渲染、输出、日志和指标等所有配置项
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(default)]
pub struct Settings {
    /// 并发控制配置
    #[validate(nested)]
    pub concurrency: ConcurrencySettings,
    /// HTTP抓取配置
    #[validate(nested)]
    pub http: HttpSettings,
    /// API探测配置
    #[validate(nested)]
    pub api_probe: ApiProbeSettings,
    /// 渲染配置
    #[validate(nested)]
    pub render: RenderSettings,
    /// 输出配置
    #[validate(nested)]
    pub output: OutputSettings,
    /// 流水线行为配置
    pub pipeline: PipelineSettings,
    /// 日志配置
    pub logging: LoggingSettings,
    /// 指标配置
    pub metrics: MetricsSettings,
}

/// 并发控制配置设置
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_heavy_within_global"))]
pub struct ConcurrencySettings {
    /// 全局并发上限
    #[validate(range(min = 1))]
    pub global: usize,
    /// 单域名并发上限
    #[validate(range(min = 1))]
    pub per_domain: usize,
    /// 同时进行的浏览器渲染上限
    #[validate(range(min = 1))]
    pub heavy: usize,
}

impl Default for ConcurrencySettings {
    fn default() -> Self {
        Self {
            global: 16,
            per_domain: 3,
            heavy: 6,
        }
    }
}

fn validate_heavy_within_global(settings: &ConcurrencySettings) -> Result<(), ValidationError> {
    if settings.heavy > settings.global {
        let mut err = ValidationError::new("heavy_exceeds_global");
        err.message = Some("concurrency.heavy must not exceed concurrency.global".into());
        return Err(err);
    }
    Ok(())
}

/// HTTP抓取配置设置
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct HttpSettings {
    /// 页面抓取超时（秒）
    #[validate(range(min = 1))]
    pub timeout_secs: u64,
    /// 可用的 User-Agent 列表
    #[validate(length(min = 1))]
    pub user_agents: Vec<String>,
    /// 代理列表，按URL哈希轮换
    pub proxies: Vec<String>,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 25,
            user_agents: vec![DEFAULT_USER_AGENT.to_string()],
            proxies: Vec::new(),
        }
    }
}

impl HttpSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn user_agent(&self) -> &str {
        self.user_agents
            .first()
            .map(String::as_str)
            .unwrap_or(DEFAULT_USER_AGENT)
    }

    /// 按URL的稳定哈希选择代理，未配置代理时返回 `None`
    pub fn proxy_for(&self, url: &str) -> Option<String> {
        if self.proxies.is_empty() {
            return None;
        }
        let mut hasher = DefaultHasher::new();
        url.hash(&mut hasher);
        let index = (hasher.finish() % self.proxies.len() as u64) as usize;
        self.proxies.get(index).cloned()
    }
}

/// API探测配置设置
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct ApiProbeSettings {
    /// 单次请求超时（秒）
    #[validate(range(min = 1))]
    pub timeout_secs: u64,
    /// 最大尝试次数
    #[validate(range(min = 1))]
    pub max_attempts: u32,
    /// 初始退避（毫秒）
    pub initial_backoff_ms: u64,
    /// 最大退避（毫秒）
    pub max_backoff_ms: u64,
}

impl Default for ApiProbeSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            max_attempts: 3,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 10_000,
        }
    }
}

impl ApiProbeSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// 渲染配置设置
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct RenderSettings {
    /// 页面加载超时（秒）
    #[validate(range(min = 1))]
    pub page_timeout_secs: u64,
    /// 提取HTML前的稳定等待（毫秒）
    pub settle_delay_ms: u64,
    /// 两段滚动之间的等待（毫秒）
    pub scroll_delay_ms: u64,
    /// 渲染结果被认为有效的最小字符数
    pub min_html_chars: usize,
    /// 等待条件（CSS选择器），为空表示不等待
    pub wait_for: Option<String>,
    /// 是否截图
    pub capture_screenshot: bool,
    /// 是否无头模式
    pub headless: bool,
    /// 远程 Chrome 调试地址，设置后不再本地启动浏览器
    pub remote_debugging_url: Option<String>,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            page_timeout_secs: 90,
            settle_delay_ms: 1_500,
            scroll_delay_ms: 200,
            min_html_chars: 2_000,
            wait_for: Some(DEFAULT_WAIT_FOR.to_string()),
            capture_screenshot: false,
            headless: true,
            remote_debugging_url: None,
        }
    }
}

impl RenderSettings {
    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn scroll_delay(&self) -> Duration {
        Duration::from_millis(self.scroll_delay_ms)
    }
}

/// 输出配置设置
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct OutputSettings {
    /// 产物根目录
    pub dir: PathBuf,
    /// 清单文件名（位于产物根目录下）
    #[validate(length(min = 1))]
    pub manifest_file: String,
    /// 失败时保留的原始HTML前缀字符数
    pub failed_prefix_chars: usize,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("out"),
            manifest_file: "manifest.jsonl".to_string(),
            failed_prefix_chars: 4_000,
        }
    }
}

impl OutputSettings {
    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(&self.manifest_file)
    }
}

/// 流水线行为配置
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// 跳过快速路径，直接渲染
    pub force_render: bool,
}

/// 日志配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// EnvFilter 语法的过滤规则
    pub filter: String,
    /// 是否输出JSON格式日志
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "info,smartfetch=debug".to_string(),
            json: false,
        }
    }
}

/// 指标配置
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    /// Prometheus 导出地址，为空则不启动导出器
    pub listen_addr: Option<String>,
}

impl Settings {
    /// 创建新的配置实例
    ///
    /// 依次合并 `config/default`、`config/{APP_ENVIRONMENT}` 与 `SMARTFETCH__` 前缀的环境变量
    pub fn new() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// 加载配置，可额外指定一个配置文件（优先级高于默认文件，低于环境变量）
    ///
    /// # Returns
    ///
    /// * `Ok(Settings)` - 成功加载并通过校验的配置
    /// * `Err(ConfigError)` - 配置加载或校验失败
    pub fn load(extra_file: Option<&Path>) -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "default".to_string());

        let mut builder = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false));

        if let Some(path) = extra_file {
            builder = builder.add_source(File::from(path).required(true));
        }

        let builder = builder.add_source(
            Environment::with_prefix("SMARTFETCH")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("http.user_agents")
                .with_list_parse_key("http.proxies")
                .try_parsing(true),
        );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.check()?;
        Ok(settings)
    }

    /// 校验配置，将校验错误转换为配置错误
    pub fn check(&self) -> Result<(), ConfigError> {
        self.validate()
            .map_err(|e| ConfigError::Message(format!("Invalid configuration: {}", e)))
    }
}

#[cfg(test)]
#[path = "settings_test.rs"]
mod tests;
