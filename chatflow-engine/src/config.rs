use std::sync::Arc;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use chatflow_core::{Tool, Value};

use crate::error::EngineError;
use crate::model::{GraphNodeDef, NodeKind};
use crate::store::GraphStore;

/// Validated configuration for an LLM node.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LlmNodeConfig {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub system_prompt: String,
    pub top_p: f64,
    pub frequency_penalty: f64,
    pub presence_penalty: f64,
}

impl Default for LlmNodeConfig {
    fn default() -> Self {
        Self {
            model: "default".to_string(),
            temperature: 0.7,
            max_tokens: 1000,
            system_prompt: "You are a helpful assistant.".to_string(),
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
        }
    }
}

impl LlmNodeConfig {
    fn validate(&self) -> Result<(), String> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(format!("temperature out of range: {}", self.temperature));
        }
        if self.max_tokens == 0 {
            return Err("max_tokens must be positive".to_string());
        }
        Ok(())
    }
}

/// Validated configuration for a tool node.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ToolNodeConfig {
    pub timeout_seconds: u64,
    pub retry_attempts: u32,
    pub parallel_execution: bool,
    pub continue_on_error: bool,
}

impl Default for ToolNodeConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 300,
            retry_attempts: 3,
            parallel_execution: false,
            continue_on_error: true,
        }
    }
}

impl ToolNodeConfig {
    fn validate(&self) -> Result<(), String> {
        if self.timeout_seconds == 0 {
            return Err("timeout_seconds must be positive".to_string());
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationType {
    MessageContent,
    ToolResult,
    Custom,
}

impl Default for EvaluationType {
    fn default() -> Self {
        Self::MessageContent
    }
}

/// Validated configuration for a condition node. `conditions` maps a
/// condition key to a target node id; insertion order decides match
/// priority, so the map type must preserve it.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ConditionNodeConfig {
    pub conditions: serde_json::Map<String, Value>,
    pub default: String,
    pub evaluation_type: EvaluationType,
}

impl ConditionNodeConfig {
    fn validate(&self) -> Result<(), String> {
        for (key, target) in &self.conditions {
            if !target.is_string() {
                return Err(format!("condition '{key}' target must be a string"));
            }
        }
        Ok(())
    }

    /// Condition keys in configured order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.conditions.keys().map(String::as_str)
    }
}

/// Validated configuration for a human-in-the-loop node.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct HumanNodeConfig {
    pub timeout_seconds: u64,
    pub prompt_template: String,
    pub allow_attachments: bool,
}

impl Default for HumanNodeConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 3600,
            prompt_template: "Please provide assistance for: {query}".to_string(),
            allow_attachments: true,
        }
    }
}

impl HumanNodeConfig {
    fn validate(&self) -> Result<(), String> {
        if self.timeout_seconds == 0 {
            return Err("timeout_seconds must be positive".to_string());
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum NodeConfig {
    Llm(LlmNodeConfig),
    Tool(ToolNodeConfig),
    Condition(ConditionNodeConfig),
    Human(HumanNodeConfig),
    /// Start and end markers carry no configuration.
    Marker,
}

/// Outcome of resolving one node's configuration. A failed validation
/// falls back to the type's defaults; the warning is surfaced through the
/// execution record's metadata rather than failing the build.
#[derive(Clone, Debug)]
pub struct ResolvedConfig {
    pub config: NodeConfig,
    pub warning: Option<String>,
}

#[derive(Default)]
pub struct ConfigResolver;

impl ConfigResolver {
    pub fn new() -> Self {
        Self
    }

    pub fn resolve(&self, node: &GraphNodeDef) -> ResolvedConfig {
        let kind = match node.kind() {
            Some(kind) => kind,
            None => {
                return ResolvedConfig {
                    config: NodeConfig::Marker,
                    warning: Some(format!(
                        "no configuration schema for node type: {}",
                        node.node_type
                    )),
                };
            }
        };
        let raw = if node.configuration.is_object() {
            node.configuration.clone()
        } else {
            Value::Object(serde_json::Map::new())
        };
        match kind {
            NodeKind::Start | NodeKind::End => ResolvedConfig {
                config: NodeConfig::Marker,
                warning: None,
            },
            NodeKind::Llm => Self::typed::<LlmNodeConfig>(node, raw, LlmNodeConfig::validate)
                .map_config(NodeConfig::Llm),
            NodeKind::Tool => Self::typed::<ToolNodeConfig>(node, raw, ToolNodeConfig::validate)
                .map_config(NodeConfig::Tool),
            NodeKind::Condition => {
                Self::typed::<ConditionNodeConfig>(node, raw, ConditionNodeConfig::validate)
                    .map_config(NodeConfig::Condition)
            }
            NodeKind::Human => Self::typed::<HumanNodeConfig>(node, raw, HumanNodeConfig::validate)
                .map_config(NodeConfig::Human),
        }
    }

    fn typed<C>(
        node: &GraphNodeDef,
        raw: Value,
        validate: impl Fn(&C) -> Result<(), String>,
    ) -> Typed<C>
    where
        C: serde::de::DeserializeOwned + Default,
    {
        let outcome = serde_json::from_value::<C>(raw)
            .map_err(|err| err.to_string())
            .and_then(|config| validate(&config).map(|_| config));
        match outcome {
            Ok(config) => Typed {
                config,
                warning: None,
            },
            Err(reason) => {
                tracing::warn!(
                    node_id = %node.node_id,
                    node_type = %node.node_type,
                    %reason,
                    "configuration validation failed, using defaults"
                );
                Typed {
                    config: C::default(),
                    warning: Some(format!(
                        "node '{}': invalid configuration ({reason}), defaults applied",
                        node.node_id
                    )),
                }
            }
        }
    }
}

struct Typed<C> {
    config: C,
    warning: Option<String>,
}

impl<C> Typed<C> {
    fn map_config(self, wrap: impl FnOnce(C) -> NodeConfig) -> ResolvedConfig {
        ResolvedConfig {
            config: wrap(self.config),
            warning: self.warning,
        }
    }
}

/// Resolves which runtime tools are bound to a node: a binding survives
/// only when enabled at both the binding and catalog level and a matching
/// executable is registered.
pub struct ToolResolver {
    store: Arc<dyn GraphStore>,
    executables: AHashMap<String, Arc<dyn Tool>>,
}

impl ToolResolver {
    pub fn new(store: Arc<dyn GraphStore>, tools: Vec<Arc<dyn Tool>>) -> Self {
        let executables = tools
            .into_iter()
            .map(|tool| (tool.name().to_string(), tool))
            .collect();
        Self { store, executables }
    }

    pub async fn resolve(&self, node_id: &str) -> Result<Vec<Arc<dyn Tool>>, EngineError> {
        let bindings = self.store.get_tools_by_node(node_id).await?;
        let mut tools = Vec::new();
        for binding in bindings {
            if !binding.enabled || !binding.tool.enabled {
                continue;
            }
            match self.executables.get(&binding.tool.name) {
                Some(tool) => tools.push(Arc::clone(tool)),
                None => tracing::warn!(
                    node_id = %node_id,
                    tool = %binding.tool.name,
                    "bound tool has no registered executable, skipping"
                ),
            }
        }
        Ok(tools)
    }
}
