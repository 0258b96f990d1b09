//! Built-in tools (§1 roster: "shell, file I/O, web fetch, web search,
//! email, webhook") and the dependency-substitution strategy table they are
//! dispatched through (§4.2, §9).

pub mod dependency;
pub mod fetch_urls;
pub mod send_email;
pub mod shell_exec;
pub mod web_search;
pub mod webhook;
pub mod write_file;

pub use fetch_urls::FetchUrlsTool;
pub use send_email::SendEmailTool;
pub use shell_exec::ShellExecTool;
pub use web_search::WebSearchTool;
pub use webhook::WebhookTool;
pub use write_file::WriteFileTool;

use dagflow_kernel::tool::ToolRegistry;
use std::sync::Arc;

/// Registers every built-in tool under its spec name. Callers needing a
/// narrower set (e.g. a sandboxed execution profile without `shellExec`)
/// can build their own `ToolRegistry` instead of calling this.
pub fn register_builtin_tools(registry: &mut ToolRegistry) {
    registry.register(Arc::new(FetchUrlsTool::new()));
    registry.register(Arc::new(WriteFileTool));
    registry.register(Arc::new(SendEmailTool::new()));
    registry.register(Arc::new(ShellExecTool));
    registry.register(Arc::new(WebSearchTool));
    registry.register(Arc::new(WebhookTool::new()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_every_tool_in_the_roster() {
        let mut registry = ToolRegistry::new();
        register_builtin_tools(&mut registry);
        for name in ["fetchURLs", "writeFile", "sendEmail", "shellExec", "webSearch", "webhook"] {
            assert!(registry.contains(name), "{name} should be registered");
        }
    }
}
