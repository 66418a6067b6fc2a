#![allow(dead_code)]

use herald_orchestrator::tools::catalog::{SEND_ESCALATION, SEND_NOTIFICATION, standard_descriptors};
use herald_orchestrator::tools::handler_fn;
use herald_orchestrator::{
    Collaborators, HeraldConfig, HeraldError, MemoryNotificationHistory, Orchestrator, ToolRegistry,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Registry whose tools answer with canned data. Notification tools record
/// into `history`; tools named in `failing` always fail.
pub fn registry(history: &Arc<MemoryNotificationHistory>, failing: &[&str]) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    for descriptor in standard_descriptors() {
        let name = descriptor.name.clone();
        let fails = failing.contains(&name.as_str());
        let history = Arc::clone(history);
        let handler = handler_fn(move |args| {
            let name = name.clone();
            let history = Arc::clone(&history);
            async move {
                if fails {
                    return Err(HeraldError::ToolExecutionFailed(format!("{name} unavailable")));
                }
                if name == SEND_NOTIFICATION || name == SEND_ESCALATION {
                    let target = args.get_string("target_id").unwrap_or_default();
                    let category = args.get_string("category").unwrap_or_default();
                    history.record(&target, &category, format!("{name} for {target}")).await;
                }
                Ok(json!({ "tool": name }))
            }
        });
        registry.register_descriptor(descriptor.with_handler(handler)).unwrap();
    }
    registry
}

pub fn orchestrator(history: &Arc<MemoryNotificationHistory>, failing: &[&str]) -> Orchestrator {
    let registry = Arc::new(registry(history, failing));
    Orchestrator::new(&HeraldConfig::default(), registry, Collaborators::in_memory(Arc::clone(history))).unwrap()
}

pub async fn drain(orchestrator: &Orchestrator) {
    tokio::time::timeout(Duration::from_secs(5), orchestrator.wait_idle()).await.expect("queue drained in time");
}
