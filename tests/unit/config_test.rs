//! Tests for configuration validation

use orderflow::config::{PipelineConfig, SchedulerConfig, ServiceConfig, WorkerPoolConfig};
use std::time::Duration;

#[test]
fn test_worker_pool_config_validation() {
    assert!(WorkerPoolConfig::new().validate().is_ok());
    assert!(WorkerPoolConfig::new().with_max_queue_depth(0).validate().is_err());

    let tiny_stack = WorkerPoolConfig {
        thread_stack_size: 1024,
        ..WorkerPoolConfig::default()
    };
    assert!(tiny_stack.validate().is_err());
}

#[test]
fn test_scheduler_config_validation() {
    assert!(SchedulerConfig::default().validate().is_ok());

    let unnamed = SchedulerConfig {
        thread_name: " ".into(),
        ..SchedulerConfig::default()
    };
    assert!(unnamed.validate().is_err());

    let no_timeout = SchedulerConfig {
        shutdown_timeout_ms: 0,
        ..SchedulerConfig::default()
    };
    assert!(no_timeout.validate().is_err());
}

#[test]
fn test_service_config_delay() {
    let stage = ServiceConfig::with_delay_secs(1.5);
    assert_eq!(stage.delay(), Duration::from_millis(1_500));
    assert!(ServiceConfig::with_delay_secs(f64::INFINITY).validate().is_err());
}

#[test]
fn test_pipeline_config_from_json() {
    let json = r#"{
        "inventory": { "delay_secs": 0.5, "workers": { "worker_count": 4 } },
        "payment": { "delay_secs": 0.25 },
        "stock": { "item_001": 3 }
    }"#;

    let cfg = PipelineConfig::from_json_str(json).unwrap();
    assert_eq!(cfg.inventory.workers.worker_count, 4);
    assert_eq!(cfg.inventory.workers.max_queue_depth, 10_000);
    assert_eq!(cfg.payment.delay(), Duration::from_millis(250));
    assert_eq!(cfg.scheduler, SchedulerConfig::default());
    assert_eq!(cfg.stock.len(), 1);
}

#[test]
fn test_pipeline_config_from_json_invalid() {
    let json = r#"{
        "inventory": { "delay_secs": -1 },
        "payment": { "delay_secs": 2 }
    }"#;
    let err = PipelineConfig::from_json_str(json).unwrap_err();
    assert!(err.starts_with("inventory invalid"));

    assert!(PipelineConfig::from_json_str("{").unwrap_err().starts_with("parse error"));
}
