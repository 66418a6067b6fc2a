// Shared fixtures for unit tests

use serde_json::json;
use std::collections::HashSet;

use crate::error::HeraldError;
use crate::tools::catalog::standard_descriptors;
use crate::tools::{ToolRegistry, handler_fn};

/// Registry with every catalog tool answering `{"tool": name, "params": args}`.
pub(crate) fn stub_registry() -> ToolRegistry {
    failing_registry(&[])
}

/// Like [`stub_registry`], but the named tools always fail.
pub(crate) fn failing_registry(failing: &[&str]) -> ToolRegistry {
    let failing: HashSet<String> = failing.iter().map(ToString::to_string).collect();
    let mut registry = ToolRegistry::new();
    for descriptor in standard_descriptors() {
        let name = descriptor.name.clone();
        let fails = failing.contains(&name);
        let handler = handler_fn(move |args| {
            let name = name.clone();
            async move {
                if fails {
                    Err(HeraldError::ToolExecutionFailed(format!("{name} unavailable")))
                } else {
                    Ok(json!({ "tool": name, "params": args.args }))
                }
            }
        });
        registry.register_descriptor(descriptor.with_handler(handler)).expect("catalog descriptors are valid");
    }
    registry
}
