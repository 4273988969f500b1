// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域模型模块
///
/// - 抓取任务（fetch_task）：一次派发的URL
/// - 提取结果（extraction）：流水线终态与对应的数据
/// - 清单记录（manifest）：每个任务写入清单的一行
pub mod extraction;
pub mod fetch_task;
pub mod manifest;
