//! Core data model, error types, and the tool/event-bus/stop-coordinator/
//! store contracts for the DAG planning-and-execution engine. Everything
//! here is a trait or a plain data type; the planner lives in
//! `dagflow-foundation`, the executor in `dagflow-runtime`.

pub mod bus;
pub mod config;
pub mod error;
pub mod model;
pub mod schema;
pub mod stop;
pub mod storage;
pub mod tool;

pub use bus::{EventBus, EventType, ExecutionEvent};
pub use error::{DagFlowError, DagFlowResult};
pub use model::*;
pub use stop::StopCoordinator;
pub use storage::Store;
pub use tool::{AbortHandle, AbortSignal, EventEmitter, Tool, ToolContext, ToolRegistry};
