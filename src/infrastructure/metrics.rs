// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{info, warn};

use crate::config::settings::MetricsSettings;

/// 任务终态计数
pub const TASKS_TOTAL: &str = "smartfetch_tasks_total";
/// 任务耗时分布
pub const TASK_DURATION_SECONDS: &str = "smartfetch_task_duration_seconds";
/// API探测尝试次数
pub const API_PROBE_ATTEMPTS_TOTAL: &str = "smartfetch_api_probe_attempts_total";
/// 进行中的浏览器渲染数
pub const HEAVY_IN_FLIGHT: &str = "smartfetch_heavy_in_flight";

/// 安装 Prometheus 导出器
///
/// 未配置监听地址时不做任何事，指标宏在没有安装记录器时是空操作。
pub fn init_metrics(settings: &MetricsSettings) {
    let Some(addr) = settings.listen_addr.as_deref() else {
        return;
    };

    let addr: SocketAddr = match addr.parse() {
        Ok(addr) => addr,
        Err(e) => {
            warn!("Invalid metrics address {}: {}", addr, e);
            return;
        }
    };

    // Ignore error if address is already in use
    if let Err(e) = PrometheusBuilder::new().with_http_listener(addr).install() {
        warn!("Failed to install Prometheus recorder: {}", e);
        return;
    }

    info!("Metrics exporter listening on {}", addr);
}
