//! The execution layer: the wave-scheduled `Executor` (§4.2) and the
//! built-in tools it dispatches to (§1, §9).

pub mod executor;
pub mod tools;

pub use executor::{ExecutionConfig, ExecutionHandle, Executor, LlmResolver};
pub use tools::{register_builtin_tools, FetchUrlsTool, SendEmailTool, ShellExecTool, WebSearchTool, WebhookTool, WriteFileTool};
