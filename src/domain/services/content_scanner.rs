// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

//! 页面内容扫描
//!
//! 基于正则的启发式扫描，只负责廉价地找出候选数据：结构化数据块、页面引导状态和
//! 前端数据接口。所有函数都是纯函数，遇到格式错误的输入时返回空结果而不是报错。

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use url::Url;

use crate::utils::url_utils;

static LD_JSON_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<script[^>]+type\s*=\s*["']application/ld\+json["'][^>]*>(.*?)</script>"#)
        .expect("ld+json pattern is valid")
});

static INLINE_STATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?s)(?:window\.)?[_A-Za-z0-9]*(?:State|INITIAL_DATA(?:__)?|INITIAL_STATE(?:__)?|__PRELOADED_STATE__) *= *(\{.*?\});",
    )
    .expect("inline state pattern is valid")
});

static TRAILING_COMMA_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",\s*([}\]])").expect("trailing comma pattern is valid"));

static API_CALL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(?:fetch\(|axios\.get|axios\(|XMLHttpRequest\().*?['"]([^'"]{10,200})['"]"#)
        .expect("api call pattern is valid")
});

/// 提取所有 `application/ld+json` 脚本块
///
/// 每个块独立解析，解析失败的块直接跳过。
pub fn extract_ld_json(html: &str) -> Vec<Value> {
    LD_JSON_RE
        .captures_iter(html)
        .filter_map(|caps| caps.get(1))
        .filter_map(|body| serde_json::from_str::<Value>(body.as_str().trim()).ok())
        .collect()
}

/// 提取第一个页面引导状态对象（如 `window.__INITIAL_STATE__ = {...};`）
///
/// 只尝试第一个匹配：直接解析失败时去掉闭合括号前的尾随逗号再试一次，仍失败则返回 `None`。
pub fn extract_inline_state(html: &str) -> Option<Value> {
    let body = INLINE_STATE_RE.captures(html)?.get(1)?.as_str();

    serde_json::from_str::<Value>(body).ok().or_else(|| {
        let fixed = TRAILING_COMMA_RE.replace_all(body, "$1");
        serde_json::from_str::<Value>(&fixed).ok()
    })
}

/// 查找前端数据请求（fetch/axios/XHR）的第一个字符串参数
///
/// 以 `/` 开头的地址基于 `base_url` 解析为绝对地址，其余保持原样。结果按出现顺序排列，不去重。
pub fn find_api_candidates(html: &str, base_url: &str) -> Vec<String> {
    let base = Url::parse(base_url).ok();

    API_CALL_RE
        .captures_iter(html)
        .filter_map(|caps| caps.get(1))
        .map(|literal| {
            let uri = literal.as_str();
            match (&base, uri.starts_with('/')) {
                (Some(base), true) => url_utils::resolve_url(base, uri)
                    .map(|u| u.to_string())
                    .unwrap_or_else(|_| uri.to_string()),
                _ => uri.to_string(),
            }
        })
        .collect()
}
