use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

/// A capability the executor can dispatch a plan step to. `params` arrives
/// as the step's resolved parameter object. Report recoverable failures by
/// returning `{success: false, error: ...}`; an `Err` is captured by the
/// executor and recorded the same way, so neither aborts the plan on its
/// own.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    /// One line for the planning prompt's tool catalog.
    fn description(&self) -> &'static str;
    async fn execute(&self, params: Value) -> Result<Value>;
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.tools.insert(tool.name().to_string(), Box::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|tool| tool.as_ref())
    }

    /// Registered tool names, sorted for stable output.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// The tool catalog rendered for the planning prompt, one `name:
    /// description` line per tool.
    pub fn describe_all(&self) -> String {
        self.names()
            .iter()
            .map(|name| {
                let tool = &self.tools[*name];
                format!("- {}: {}", tool.name(), tool.description())
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
