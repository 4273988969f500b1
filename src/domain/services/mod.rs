// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域服务模块
///
/// - 内容扫描（content_scanner）：从HTML中找出结构化数据和接口候选
/// - 结果记录（outcome_recorder）：写入产物并追加清单
pub mod content_scanner;
pub mod outcome_recorder;
