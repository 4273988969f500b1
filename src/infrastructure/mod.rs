// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 基础设施层模块
///
/// - 清单（manifest）：JSONL 清单文件
/// - 指标（metrics）：Prometheus 导出器与指标名称
/// - 存储（storage）：本地文件系统存储
pub mod manifest;
pub mod metrics;
pub mod storage;
