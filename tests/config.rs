// tests/config.rs
use std::io::Write;
use std::sync::Arc;

use news_impact_scanner::classify::{build_classifier, Region};
use news_impact_scanner::config::{ai::ENV_AI_TEST_MODE, FatalConfigError, ScanConfig};
use news_impact_scanner::history::History;
use news_impact_scanner::scan::ScanServices;
use serial_test::serial;

#[test]
fn shipped_sample_config_loads_and_matches_defaults() {
    let cfg = ScanConfig::load_from_file("config/scanner.toml").expect("sample config");
    let def = ScanConfig::default();
    assert_eq!(cfg.queries, def.queries);
    assert_eq!(cfg.ranking.groups, def.ranking.groups);
    assert_eq!(cfg.batch.batch_size, 5);
    assert_eq!(cfg.fallback.region_by_category, def.fallback.region_by_category);
    assert_eq!(cfg.fallback.default_region, Region::Global);
}

#[test]
fn invalid_file_reports_path() {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    writeln!(f, "[batch]\nbatch_size = \"five\"").unwrap();
    let err = ScanConfig::load_from_file(f.path()).unwrap_err();
    assert!(format!("{err:#}").contains(&f.path().display().to_string()));
}

#[test]
#[serial]
fn mock_mode_disables_remote_classifier_without_credentials() {
    std::env::set_var(ENV_AI_TEST_MODE, "mock");
    let mut cfg = ScanConfig::default();
    cfg.ai.api_key = String::new();
    let c = build_classifier(&cfg.ai, cfg.batch.call_timeout()).unwrap();
    assert_eq!(c.name(), "disabled");
    std::env::remove_var(ENV_AI_TEST_MODE);
}

#[test]
#[serial]
fn missing_classifier_key_is_fatal() {
    std::env::remove_var(ENV_AI_TEST_MODE);
    let mut cfg = ScanConfig::default();
    cfg.ai.api_key = String::new();
    let err = build_classifier(&cfg.ai, cfg.batch.call_timeout()).err();
    assert_eq!(err, Some(FatalConfigError::MissingCredential("CLAUDE_API_KEY")));
}

#[test]
#[serial]
fn literal_keys_wire_http_upstreams() {
    std::env::remove_var(ENV_AI_TEST_MODE);
    let mut cfg = ScanConfig::default();
    cfg.search.api_key = "news-key".to_string();
    cfg.ai.api_key = "ai-key".to_string();
    let services = ScanServices::from_config(cfg, Arc::new(History::with_capacity(4)))
        .expect("http clients build");
    assert_eq!(services.classifier.name(), "claude");
}

#[test]
fn http_client_failure_is_a_config_error() {
    let err = FatalConfigError::HttpClient("no TLS backend".to_string());
    assert_eq!(err.to_string(), "cannot build HTTP client: no TLS backend");
}
