use std::collections::HashSet;

/// Name of the capability that ends a rollout successfully.
pub const TERMINATE_TOOL: &str = "terminate";

/// Shell-execution tool; receives an injected `work_dir` when absent.
pub const SHELL_TOOL: &str = "execute_bash";

/// SQL tools served by the execution endpoint.
pub const DATABASE_TOOLS: [&str; 4] = [
    "execute_database_sql",
    "execute_mysql_sql",
    "execute_postgresql_sql",
    "execute_sqlite_sql",
];

/// Classified tool name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ToolKind {
    Terminate,
    Shell,
    Database(String),
    /// Extra name registered at startup and served by the endpoint.
    Registered(String),
    /// Name nobody registered; never sent to the endpoint.
    Unknown(String),
}

impl ToolKind {
    /// Classify against the built-in vocabulary only.
    pub fn builtin(name: &str) -> Self {
        match name {
            TERMINATE_TOOL => ToolKind::Terminate,
            SHELL_TOOL => ToolKind::Shell,
            n if DATABASE_TOOLS.contains(&n) => ToolKind::Database(n.to_string()),
            n => ToolKind::Unknown(n.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ToolKind::Terminate => TERMINATE_TOOL,
            ToolKind::Shell => SHELL_TOOL,
            ToolKind::Database(n) | ToolKind::Registered(n) | ToolKind::Unknown(n) => n,
        }
    }

    /// Whether calls of this kind go to the execution endpoint.
    pub fn is_dispatchable(&self) -> bool {
        !matches!(self, ToolKind::Terminate | ToolKind::Unknown(_))
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl From<String> for ToolKind {
    fn from(name: String) -> Self {
        ToolKind::builtin(&name)
    }
}

/// Known tool names: the built-ins plus any extras served by the endpoint.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    extra: HashSet<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an additional endpoint-served tool name.
    pub fn with_tool(mut self, name: impl Into<String>) -> Self {
        self.extra.insert(name.into());
        self
    }

    pub fn resolve(&self, name: &str) -> ToolKind {
        match ToolKind::builtin(name) {
            ToolKind::Unknown(n) if self.extra.contains(&n) => ToolKind::Registered(n),
            kind => kind,
        }
    }

    pub fn is_known(&self, name: &str) -> bool {
        !matches!(self.resolve(name), ToolKind::Unknown(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_resolution() {
        let registry = ToolRegistry::new();
        assert_eq!(registry.resolve("terminate"), ToolKind::Terminate);
        assert_eq!(registry.resolve("execute_bash"), ToolKind::Shell);
        assert_eq!(
            registry.resolve("execute_sqlite_sql"),
            ToolKind::Database("execute_sqlite_sql".to_string())
        );
        assert_eq!(
            registry.resolve("rm_rf"),
            ToolKind::Unknown("rm_rf".to_string())
        );
    }

    #[test]
    fn test_registered_tools_become_dispatchable() {
        let registry = ToolRegistry::new().with_tool("fetch_doc");
        let kind = registry.resolve("fetch_doc");
        assert_eq!(kind, ToolKind::Registered("fetch_doc".to_string()));
        assert!(kind.is_dispatchable());
        assert!(registry.is_known("fetch_doc"));
        assert!(!ToolKind::Terminate.is_dispatchable());
        assert!(!registry.resolve("other").is_dispatchable());
    }
}
