use super::*;

#[test]
fn default_config_uses_euclidean() {
    let config = Config::create_default();
    assert_eq!(config.metric, Distance::Euclidean);
    assert_eq!(config.dimension, 0);
    assert_eq!(config.max_degree, DEFAULT_MAX_DEGREE);
    assert_eq!(config.ef_construction, DEFAULT_EF_CONSTRUCTION);
    assert_eq!(config.ef_search, DEFAULT_EF_SEARCH);
}

#[test]
fn create_accepts_valid_parameters() {
    let config =
        Config::create(128, Distance::Cosine, 32, 200, 80).expect("config must be valid");
    assert_eq!(config.dimension, 128);
    assert_eq!(config.metric, Distance::Cosine);
}

#[test]
fn create_rejects_zero_dimension() {
    let error = Config::create(0, Distance::Euclidean, 16, 128, 64).expect_err("must fail");
    let message = error.to_string();
    assert!(message.contains("dimension"), "got: {message}");
}

#[test]
fn create_rejects_small_fan_out() {
    let error = Config::create(8, Distance::Euclidean, 1, 128, 64).expect_err("must fail");
    assert!(error.to_string().contains("max_degree"));
}

#[test]
fn create_rejects_construction_breadth_below_fan_out() {
    let error = Config::create(8, Distance::Euclidean, 16, 8, 64).expect_err("must fail");
    assert!(error.to_string().contains("ef_construction"));
}

#[test]
fn create_rejects_zero_search_breadth() {
    let error = Config::create(8, Distance::Euclidean, 16, 128, 0).expect_err("must fail");
    assert!(error.to_string().contains("ef_search"));
}

#[test]
fn config_serializes_with_metric_name() {
    let config = Config::create(4, Distance::Dot, 8, 64, 32).expect("config must be valid");
    let json = serde_json::to_string(&config).expect("config must serialize");
    assert!(json.contains("\"dot\""), "got: {json}");

    let back: Config = serde_json::from_str(&json).expect("config must deserialize");
    assert_eq!(back, config);
}
