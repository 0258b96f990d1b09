//! `dagflow events` command implementation: stream an execution's bus
//! events to stdout as newline-delimited JSON until a terminal event closes
//! the stream (§4.3, §6 `streamEvents`).

use crate::context::CliContext;
use crate::error::CliError;
use futures::StreamExt;

pub async fn run(ctx: &CliContext, execution_id: String) -> Result<(), CliError> {
    let mut stream = Box::pin(ctx.bus.subscribe(&execution_id));
    while let Some(event) = stream.next().await {
        println!("{}", serde_json::to_string(&event)?);
    }
    Ok(())
}
