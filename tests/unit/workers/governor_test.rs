// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use smartfetch::config::settings::ConcurrencySettings;
use smartfetch::workers::governor::ConcurrencyGovernor;
use std::time::Duration;

#[tokio::test]
async fn test_governor_from_settings() {
    let settings = ConcurrencySettings {
        global: 4,
        per_domain: 2,
        heavy: 1,
    };
    let governor = ConcurrencyGovernor::from_settings(&settings);

    assert_eq!(governor.global_available(), 4);
    assert_eq!(governor.heavy_available(), 1);
    assert_eq!(governor.domain_available("example.com"), 2);
    assert_eq!(governor.tracked_domains(), 0);
}

#[tokio::test]
async fn test_task_waits_for_domain_slot() {
    let governor = ConcurrencyGovernor::new(8, 1, 1);
    let first = governor.acquire_task("example.com").await.unwrap();

    let blocked = tokio::time::timeout(
        Duration::from_millis(50),
        governor.acquire_task("example.com"),
    )
    .await;
    assert!(blocked.is_err(), "second task must wait for the domain slot");
    // 等待中的任务没有占用全局名额
    assert_eq!(governor.global_available(), 7);

    drop(first);
    let second = tokio::time::timeout(
        Duration::from_millis(500),
        governor.acquire_task("example.com"),
    )
    .await;
    assert!(second.is_ok());
}

#[tokio::test]
async fn test_heavy_permit_is_exclusive_at_capacity_one() {
    let governor = ConcurrencyGovernor::new(8, 3, 1);
    let held = governor.acquire_heavy().await.unwrap();

    let blocked = tokio::time::timeout(Duration::from_millis(50), governor.acquire_heavy()).await;
    assert!(blocked.is_err());

    drop(held);
    assert_eq!(governor.heavy_available(), 1);
}
