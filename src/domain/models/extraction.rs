// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// 流水线终态
///
/// 序列化后的字符串即清单中的 `stage` 字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// 页面内嵌JSON（ld+json 或内联状态）
    #[serde(rename = "fast-json")]
    FastJson,
    /// 页面中发现的API接口
    #[serde(rename = "fast-api")]
    FastApi,
    /// 浏览器渲染
    #[serde(rename = "heavy")]
    Heavy,
    /// 所有策略均未得到内容
    #[serde(rename = "failed")]
    Failed,
    /// 处理过程中出现未预期的错误
    #[serde(rename = "exception")]
    Exception,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::FastJson => "fast-json",
            Stage::FastApi => "fast-api",
            Stage::Heavy => "heavy",
            Stage::Failed => "failed",
            Stage::Exception => "exception",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 提取结果
///
/// 每个正常结束的任务恰好产生一个结果，结果的变体决定写入的产物。
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionResult {
    /// 页面内嵌的结构化数据
    FastJson {
        /// 所有可解析的 ld+json 块
        ld: Vec<Value>,
        /// 第一个内联状态对象
        inline: Option<Value>,
    },
    /// 从页面发现的接口获取的JSON
    ApiJson {
        /// 命中的接口地址
        endpoint: String,
        /// 接口返回的数据
        payload: Value,
    },
    /// 浏览器渲染后的完整页面
    RenderedPage {
        html: String,
        /// PNG 截图
        screenshot: Option<Vec<u8>>,
    },
    /// 所有策略均失败
    Failure {
        /// 失败原因
        reason: String,
        /// 原始抓取HTML的前缀，用于诊断
        diagnostic_html: String,
    },
}

impl ExtractionResult {
    pub fn stage(&self) -> Stage {
        match self {
            ExtractionResult::FastJson { .. } => Stage::FastJson,
            ExtractionResult::ApiJson { .. } => Stage::FastApi,
            ExtractionResult::RenderedPage { .. } => Stage::Heavy,
            ExtractionResult::Failure { .. } => Stage::Failed,
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, ExtractionResult::Failure { .. })
    }
}

/// 判断一个JSON值是否"有内容"
///
/// `null`、`false`、`0`、空字符串、空数组与空对象都被视为空结果。
pub fn is_usable_json(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}
