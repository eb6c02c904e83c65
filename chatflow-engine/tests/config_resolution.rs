use serde_json::json;
use uuid::Uuid;

use chatflow_core::{LlmParams, Value};
use chatflow_engine::{llm_params, ConfigResolver, GraphNodeDef, LlmNodeConfig, NodeConfig};

fn node(node_type: &str, configuration: Value) -> GraphNodeDef {
    GraphNodeDef {
        id: Uuid::new_v4(),
        node_id: "n1".to_string(),
        node_type: node_type.to_string(),
        name: "n1".to_string(),
        configuration,
        position: (0, 0),
    }
}

#[test]
fn valid_llm_configuration_is_used_as_given() {
    let resolver = ConfigResolver::new();
    let resolved = resolver.resolve(&node(
        "llm",
        json!({ "model": "fast-model", "temperature": 0.2, "max_tokens": 64 }),
    ));

    let NodeConfig::Llm(config) = resolved.config else {
        panic!("expected llm config");
    };
    assert_eq!(config.model, "fast-model");
    assert_eq!(config.temperature, 0.2);
    assert_eq!(config.max_tokens, 64);
    assert!(resolved.warning.is_none());
}

#[test]
fn out_of_range_temperature_falls_back_to_defaults() {
    let resolver = ConfigResolver::new();
    let resolved = resolver.resolve(&node("llm", json!({ "temperature": 7.5 })));

    let NodeConfig::Llm(config) = resolved.config else {
        panic!("expected llm config");
    };
    assert_eq!(config.temperature, 0.7);
    let warning = resolved.warning.unwrap();
    assert!(warning.contains("defaults applied"), "{warning}");
}

#[test]
fn wrong_value_type_falls_back_to_defaults() {
    let resolver = ConfigResolver::new();
    let resolved = resolver.resolve(&node("tool", json!({ "timeout_seconds": "soon" })));

    let NodeConfig::Tool(config) = resolved.config else {
        panic!("expected tool config");
    };
    assert_eq!(config.timeout_seconds, 300);
    assert!(resolved.warning.is_some());
}

#[test]
fn non_object_configuration_resolves_to_defaults_without_warning() {
    let resolver = ConfigResolver::new();
    let resolved = resolver.resolve(&node("human", Value::Null));

    let NodeConfig::Human(config) = resolved.config else {
        panic!("expected human config");
    };
    assert_eq!(config.timeout_seconds, 3600);
    assert!(resolved.warning.is_none());
}

#[test]
fn condition_targets_must_be_strings() {
    let resolver = ConfigResolver::new();
    let resolved = resolver.resolve(&node(
        "condition",
        json!({ "conditions": { "yes": 42 }, "default": "end" }),
    ));

    let NodeConfig::Condition(config) = resolved.config else {
        panic!("expected condition config");
    };
    assert!(config.conditions.is_empty());
    assert!(resolved.warning.is_some());
}

#[test]
fn resolved_llm_config_merges_with_engine_defaults() {
    let resolver = ConfigResolver::new();
    let resolved = resolver.resolve(&node("llm", json!({ "temperature": 0.2 })));
    let NodeConfig::Llm(config) = resolved.config else {
        panic!("expected llm config");
    };

    let defaults = LlmParams {
        model: "engine-default".to_string(),
        ..LlmParams::default()
    };
    let params = llm_params(&config, &defaults);
    assert_eq!(params.model, "engine-default");
    assert_eq!(params.temperature, 0.2);
}

#[test]
fn node_model_override_wins_over_engine_defaults() {
    let config = LlmNodeConfig {
        model: "pinned".to_string(),
        ..LlmNodeConfig::default()
    };
    let params = llm_params(&config, &LlmParams::default());
    assert_eq!(params.model, "pinned");
}

#[test]
fn markers_carry_no_configuration() {
    let resolver = ConfigResolver::new();
    let resolved = resolver.resolve(&node("start", json!({ "ignored": true })));
    assert!(matches!(resolved.config, NodeConfig::Marker));

    let resolved = resolver.resolve(&node("warp", json!({})));
    assert!(matches!(resolved.config, NodeConfig::Marker));
    assert!(resolved.warning.is_some());
}
