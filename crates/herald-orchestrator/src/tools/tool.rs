// Tool abstractions
//
// A tool is a named external operation (fetch a build, post a notification,
// summarize logs). This module defines the descriptor, parameter schema and
// invocation contract shared by the registry, planner and executor.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::error::Result;

/// Grouping label for tools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCategory {
    /// Reads from the external tracker or CI system
    Fetch,
    /// Calls the text-generation service
    Summarize,
    /// Sends outbound notifications
    Notify,
    /// Anything else
    Other,
}

impl ToolCategory {
    /// Whether tools in this category call out to the external system.
    pub fn is_external(self) -> bool {
        matches!(self, Self::Fetch)
    }
}

impl fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Fetch => "fetch",
            Self::Summarize => "summarize",
            Self::Notify => "notify",
            Self::Other => "other",
        };
        f.write_str(s)
    }
}

/// Primitive type expected for a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    /// JSON string
    String,
    /// Any JSON number
    Number,
    /// JSON integer
    Integer,
    /// JSON boolean
    Boolean,
    /// JSON object
    Object,
    /// JSON array
    Array,
}

impl ParamType {
    /// Whether a JSON value has this type.
    pub fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
        };
        f.write_str(s)
    }
}

/// Tool property schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolPropertySchema {
    /// Property type
    #[serde(rename = "type")]
    pub property_type: ParamType,
    /// Property description
    pub description: String,
}

/// Tool parameters schema
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolParameters {
    /// Property definitions
    pub properties: BTreeMap<String, ToolPropertySchema>,
    /// Required property names
    pub required: Vec<String>,
}

impl ToolParameters {
    /// Create an empty schema
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a property to the schema
    #[must_use]
    pub fn add_property(
        mut self,
        name: impl Into<String>,
        property_type: ParamType,
        description: impl Into<String>,
        required: bool,
    ) -> Self {
        let name = name.into();
        self.properties.insert(
            name.clone(),
            ToolPropertySchema { property_type, description: description.into() },
        );
        if required {
            self.required.push(name);
        }
        self
    }

    /// Check presence and primitive type of `args` against the schema.
    ///
    /// Returns one message per problem. An empty list means the arguments
    /// conform; a non-conforming call may still proceed.
    pub fn validate(&self, args: &Value) -> Vec<String> {
        let mut problems = Vec::new();
        let Some(object) = args.as_object() else {
            problems.push("parameters must be a JSON object".to_string());
            return problems;
        };

        for name in &self.required {
            match object.get(name) {
                None | Some(Value::Null) => problems.push(format!("missing required parameter '{name}'")),
                Some(_) => {}
            }
        }

        for (name, schema) in &self.properties {
            if let Some(value) = object.get(name) {
                if !value.is_null() && !schema.property_type.matches(value) {
                    problems.push(format!(
                        "parameter '{name}' should be {} but was {}",
                        schema.property_type,
                        json_type_name(value)
                    ));
                }
            }
        }

        problems
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Documented example invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolExample {
    /// What the example demonstrates
    pub description: String,
    /// Example parameters
    pub parameters: Value,
}

/// Arguments passed to tool handler
#[derive(Debug, Clone, PartialEq)]
pub struct ToolArguments {
    /// Parsed arguments as JSON value
    pub args: Value,
}

impl ToolArguments {
    /// Create new tool arguments
    pub fn new(args: Value) -> Self {
        Self { args }
    }

    /// Get argument as string
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.args.get(key)?.as_str().map(str::to_string)
    }

    /// Get argument as i64
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.args.get(key)?.as_i64()
    }

    /// Get argument as object
    pub fn get_object(&self, key: &str) -> Option<&Map<String, Value>> {
        self.args.get(key)?.as_object()
    }

    /// Result of a dependency step, if it succeeded.
    ///
    /// The executor injects dependency results under the `upstream` key.
    pub fn upstream(&self, step_id: &str) -> Option<&Value> {
        self.get_object("upstream")?.get(step_id).filter(|v| !v.is_null())
    }
}

/// Handler for tool execution
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Execute the tool with given arguments
    async fn execute(&self, args: &ToolArguments) -> Result<Value>;
}

/// Adapter turning an async closure into a [`ToolHandler`].
pub struct FnHandler<F> {
    func: F,
}

#[async_trait]
impl<F> ToolHandler for FnHandler<F>
where
    F: Fn(ToolArguments) -> BoxFuture<'static, Result<Value>> + Send + Sync,
{
    async fn execute(&self, args: &ToolArguments) -> Result<Value> {
        (self.func)(args.clone()).await
    }
}

/// Wrap an async closure as a shareable tool handler.
///
/// ```
/// use herald_orchestrator::tools::handler_fn;
/// use serde_json::json;
///
/// let handler = handler_fn(|args| async move { Ok(json!({ "echo": args.args })) });
/// # let _ = handler;
/// ```
pub fn handler_fn<F, Fut>(func: F) -> Arc<dyn ToolHandler>
where
    F: Fn(ToolArguments) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(FnHandler { func: move |args| -> BoxFuture<'static, Result<Value>> { Box::pin(func(args)) } })
}

/// Tool definition
#[derive(Clone)]
pub struct ToolDescriptor {
    /// Tool name (unique within a registry)
    pub name: String,
    /// Tool description
    pub description: String,
    /// Grouping label
    pub category: ToolCategory,
    /// Parameter schema
    pub parameters: ToolParameters,
    /// Invocation contract; a descriptor without one cannot be registered
    pub handler: Option<Arc<dyn ToolHandler>>,
    /// Usage examples for documentation
    pub examples: Vec<ToolExample>,
}

impl ToolDescriptor {
    /// Create a descriptor without a handler
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        category: ToolCategory,
        parameters: ToolParameters,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            category,
            parameters,
            handler: None,
            examples: Vec::new(),
        }
    }

    /// Attach the invocation contract
    #[must_use]
    pub fn with_handler(mut self, handler: Arc<dyn ToolHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Add a documented example
    #[must_use]
    pub fn with_example(mut self, description: impl Into<String>, parameters: Value) -> Self {
        self.examples.push(ToolExample { description: description.into(), parameters });
        self
    }
}

// Implement Debug manually since Arc<dyn ToolHandler> doesn't implement Debug
impl fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("category", &self.category)
            .field("parameters", &self.parameters)
            .field("handler", &self.handler.as_ref().map(|_| "<handler>"))
            .field("examples", &self.examples.len())
            .finish()
    }
}

/// Uniform result of one invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolEnvelope {
    /// Tool that was invoked
    pub tool: String,
    /// Whether the handler succeeded
    pub success: bool,
    /// Handler output on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error message on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
    /// When the invocation finished
    pub timestamp: DateTime<Utc>,
    /// Schema problems found before invoking
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validation_warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_parameters_builder() {
        let params = ToolParameters::new()
            .add_property("build_id", ParamType::String, "Build to fetch", true)
            .add_property("include_logs", ParamType::Boolean, "Also fetch logs", false);

        assert_eq!(params.properties.len(), 2);
        assert_eq!(params.required, vec!["build_id".to_string()]);
    }

    #[test]
    fn test_validate_reports_missing_and_mistyped() {
        let params = ToolParameters::new()
            .add_property("build_id", ParamType::String, "Build to fetch", true)
            .add_property("limit", ParamType::Integer, "Max entries", false);

        assert!(params.validate(&json!({"build_id": "b-1", "limit": 5})).is_empty());

        let problems = params.validate(&json!({"limit": "five"}));
        assert_eq!(problems.len(), 2);
        assert!(problems.iter().any(|p| p.contains("missing required parameter 'build_id'")));
        assert!(problems.iter().any(|p| p.contains("'limit' should be integer but was string")));

        let problems = params.validate(&json!("not an object"));
        assert_eq!(problems, vec!["parameters must be a JSON object".to_string()]);
    }

    #[test]
    fn test_null_required_counts_as_missing() {
        let params = ToolParameters::new().add_property("id", ParamType::String, "Id", true);
        assert_eq!(params.validate(&json!({"id": null})).len(), 1);
    }

    #[test]
    fn test_tool_arguments_accessors() {
        let args = ToolArguments::new(json!({
            "target_id": "42",
            "count": 3,
            "upstream": {"step_1": {"title": "Bug"}, "step_2": null}
        }));

        assert_eq!(args.get_string("target_id"), Some("42".to_string()));
        assert_eq!(args.get_i64("count"), Some(3));
        assert_eq!(args.get_string("missing"), None);
        assert_eq!(args.upstream("step_1"), Some(&json!({"title": "Bug"})));
        assert_eq!(args.upstream("step_2"), None);
    }

    #[tokio::test]
    async fn test_handler_fn_runs_closure() {
        let handler = handler_fn(|args| async move { Ok(json!({"echo": args.get_string("x")})) });
        let out = handler.execute(&ToolArguments::new(json!({"x": "hi"}))).await.unwrap();
        assert_eq!(out, json!({"echo": "hi"}));
    }
}
