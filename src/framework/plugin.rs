//! Plugin contract
//!
//! Plugins run alongside a whole audit rather than per page. They are started
//! while the framework prepares, run concurrently with crawling and auditing,
//! and are awaited during cleanup. A plugin's result is stored in the
//! [`AuditStore`](crate::framework::AuditStore) under its name.

use crate::framework::Framework;
use async_trait::async_trait;
use serde::Serialize;

/// Name and description of a registered plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginInfo {
    pub name: String,
    pub description: String,
}

#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Runs with a handle to the framework that started it
    async fn run(&self, framework: Framework) -> anyhow::Result<serde_json::Value>;

    fn info(&self) -> PluginInfo {
        PluginInfo {
            name: self.name().to_string(),
            description: self.description().to_string(),
        }
    }
}
