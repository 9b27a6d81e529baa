use std::time::Duration;

use test_case::test_case;

use crate::config::{MAX_SLOTS, PipelineConfig};
use crate::error::Error;

/// Serialize tests touching `TANDEM_*` variables.
static ENV_LOCK: parking_lot::Mutex<()> = parking_lot::Mutex::new(());

const VARS: [&str; 4] = ["TANDEM_SLOTS", "TANDEM_ROWS_PER_CHUNK", "TANDEM_WAIT_TIMEOUT_MS", "TANDEM_TRACE_EVENTS"];

fn clear_env() {
    for var in VARS {
        unsafe { std::env::remove_var(var) };
    }
}

#[test]
fn test_defaults() {
    let config = PipelineConfig::default();
    assert_eq!(config.slots, 2);
    assert_eq!(config.rows_per_chunk, 1);
    assert_eq!(config.wait_timeout, None);
    assert!(!config.trace_events);
    assert_eq!(config.queue_name, "ooo_queue");
    config.validate().unwrap();
}

#[test_case(1, 1, None, true ; "single slot")]
#[test_case(MAX_SLOTS, 8, Some(10), true ; "max slots")]
#[test_case(0, 1, None, false ; "zero slots")]
#[test_case(MAX_SLOTS + 1, 1, None, false ; "too many slots")]
#[test_case(2, 0, None, false ; "empty chunks")]
#[test_case(2, 1, Some(0), false ; "zero deadline")]
fn test_validate(slots: usize, rows_per_chunk: usize, timeout_ms: Option<u64>, valid: bool) {
    let config = PipelineConfig::builder()
        .slots(slots)
        .rows_per_chunk(rows_per_chunk)
        .maybe_wait_timeout(timeout_ms.map(Duration::from_millis))
        .build();

    match config.validate() {
        Ok(()) => assert!(valid, "{config:?} should be rejected"),
        Err(Error::InvalidConfig { reason }) => assert!(!valid, "{config:?} rejected: {reason}"),
        Err(other) => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_from_env_unset() {
    let _guard = ENV_LOCK.lock();
    clear_env();

    let config = PipelineConfig::from_env();
    assert_eq!(config, PipelineConfig::default());
}

#[test]
fn test_from_env_parses() {
    let _guard = ENV_LOCK.lock();
    unsafe {
        std::env::set_var("TANDEM_SLOTS", "3");
        std::env::set_var("TANDEM_ROWS_PER_CHUNK", "16");
        std::env::set_var("TANDEM_WAIT_TIMEOUT_MS", "250");
        std::env::set_var("TANDEM_TRACE_EVENTS", "1");
    }

    let config = PipelineConfig::from_env();
    clear_env();

    assert_eq!(config.slots, 3);
    assert_eq!(config.rows_per_chunk, 16);
    assert_eq!(config.wait_timeout, Some(Duration::from_millis(250)));
    assert!(config.trace_events);
}

#[test]
fn test_from_env_ignores_garbage() {
    let _guard = ENV_LOCK.lock();
    unsafe {
        std::env::set_var("TANDEM_SLOTS", "two");
        std::env::set_var("TANDEM_WAIT_TIMEOUT_MS", "0");
    }

    let config = PipelineConfig::from_env();
    clear_env();

    assert_eq!(config.slots, 2);
    assert_eq!(config.wait_timeout, None);
}
