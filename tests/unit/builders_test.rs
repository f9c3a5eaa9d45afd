//! Tests for builder modules

use orderflow::builders::{build_pipeline, BuildError};
use orderflow::config::{PipelineConfig, SchedulerConfig, ServiceConfig, WorkerPoolConfig};
use orderflow::infra::InMemoryEventBus;
use std::sync::Arc;

fn small_config() -> PipelineConfig {
    let stage = ServiceConfig {
        workers: WorkerPoolConfig::new().with_worker_count(1),
        delay_secs: 0.0,
    };
    PipelineConfig {
        inventory: stage.clone(),
        payment: stage,
        ..PipelineConfig::default()
    }
}

#[test]
fn test_pipeline_builder_seeds_ledger() {
    let pipeline = build_pipeline(&small_config(), Arc::new(InMemoryEventBus::new())).unwrap();

    assert_eq!(pipeline.ledger.len(), 4);
    assert_eq!(pipeline.ledger.get_quantity("item_003"), 9_999_999);
    assert_eq!(pipeline.inventory.stats().worker_count, 1);
    assert_eq!(pipeline.payment.stats().worker_count, 1);
    assert!(pipeline.orders.is_empty());
    pipeline.shutdown();
}

#[test]
fn test_pipeline_builder_rejects_invalid_config() {
    let cfg = PipelineConfig {
        scheduler: SchedulerConfig {
            thread_name: String::new(),
            ..SchedulerConfig::default()
        },
        ..small_config()
    };
    let result = build_pipeline(&cfg, Arc::new(InMemoryEventBus::new()));
    assert!(matches!(result, Err(BuildError::InvalidConfig(msg)) if msg.starts_with("scheduler invalid")));
}

#[test]
fn test_pipeline_builder_fails_on_closed_bus() {
    let bus = Arc::new(InMemoryEventBus::new());
    bus.close();
    let result = build_pipeline(&small_config(), bus);
    assert!(matches!(result, Err(BuildError::Bus(_))));
}
