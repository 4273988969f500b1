// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 工作器模块
///
/// 提供任务派发、并发控制和逐URL的升级式提取流水线
pub mod governor;
pub mod manager;
pub mod pipeline;
