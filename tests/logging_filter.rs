// tests/logging_filter.rs

use orchestrator::cli::LogLevel;
use orchestrator::logging::build_filter;

#[test]
fn cli_level_wins_over_environment() {
    let filter = build_filter(Some(LogLevel::Debug), Some("error"), Some("trace"));
    assert_eq!(filter.to_string(), "debug");
}

#[test]
fn orchestrator_log_accepts_target_directives() {
    let filter = build_filter(None, Some("orchestrator::engine=trace"), Some("warn"));
    assert!(filter.to_string().contains("orchestrator::engine=trace"), "{filter}");
}

#[test]
fn falls_back_to_rust_log_then_info() {
    let filter = build_filter(None, None, Some("warn"));
    assert_eq!(filter.to_string(), "warn");

    let filter = build_filter(None, Some("orchestrator=loud"), Some("error"));
    assert_eq!(filter.to_string(), "error");

    let filter = build_filter(None, Some("  "), None);
    assert_eq!(filter.to_string(), "info");
}
