// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sha2::{Digest, Sha256};
use url::{ParseError, Url};

/// 文件名主体的最大长度
const MAX_BASE_LEN: usize = 200;

/// 将可能为相对路径的URL转换为绝对路径URL
pub fn resolve_url(base_url: &Url, path: &str) -> Result<Url, ParseError> {
    base_url.join(path)
}

/// 提取URL的网络位置（host[:port]）
///
/// 无法解析的URL返回空字符串，调用方在抓取阶段会得到明确的错误。
pub fn domain_of(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => match (parsed.host_str(), parsed.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            _ => String::new(),
        },
        Err(_) => String::new(),
    }
}

/// 将任意字符串清洗为文件系统安全的片段
///
/// 仅保留字母数字以及 `.`、`_`、`-`，其余字符替换为 `_`。
pub fn sanitize(input: &str) -> String {
    input
        .chars()
        .map(|ch| {
            if ch.is_alphanumeric() || matches!(ch, '.' | '_' | '-') {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

/// URL的短内容哈希（SHA-256 前10位十六进制）
pub fn short_hash(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    let mut hex = hex::encode(digest);
    hex.truncate(10);
    hex
}

/// 根据URL生成确定性的产物文件名主体（不含扩展名）
///
/// 由 `netloc + path` 清洗后截断，再附加短哈希，保证同一URL多次运行得到同一个文件名，
/// 而不同URL即使路径清洗后相同也不会冲突。
pub fn safe_file_stem(url: &str) -> String {
    let base = match Url::parse(url) {
        Ok(parsed) => {
            let netloc = domain_of(url);
            let joined = format!("{}{}", netloc, parsed.path());
            if joined.is_empty() {
                "page".to_string()
            } else {
                joined
            }
        }
        Err(_) => "page".to_string(),
    };

    let safe: String = sanitize(&base).chars().take(MAX_BASE_LEN).collect();
    format!("{}_{}", safe, short_hash(url))
}
