use std::time::Duration;

use fieldops_client::{CacheEvent, FieldOpsClient, RenderState, ResourceView};
use fieldops_interchange::{ResourceKind, Scope};
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

use crate::output::{records_json, table};
use crate::OutputFormat;

fn print_view(view: &ResourceView, output: OutputFormat) {
    let rows = view.rows();
    match output {
        OutputFormat::Json => {
            let state = match view.render() {
                RenderState::Failed(message) => json!({ "error": message }),
                _ => json!({ "total": rows.len(), "records": records_json(&rows) }),
            };
            println!("{}", state);
        }
        OutputFormat::Text => match view.render() {
            RenderState::Loading => println!("Loading..."),
            RenderState::Failed(message) => println!("Failed to load: {}", message),
            RenderState::Empty if view.session_expired() => println!("Session expired."),
            RenderState::Empty => println!("No {} found.", view.kind().name().replace('_', " ")),
            RenderState::Rows(n) => {
                print!("{}", table(view.kind(), &rows));
                println!("({} rows)\n", n);
            }
        },
    }
}

/// Poll a collection, printing it after every refresh.
pub(crate) async fn cmd_watch(
    client: &FieldOpsClient,
    kind: ResourceKind,
    scope: Scope,
    interval: Option<u64>,
    count: Option<usize>,
    output: OutputFormat,
) -> Result<(), String> {
    if interval == Some(0) {
        return Err("--interval must be at least 1 second".to_string());
    }
    let mut view = ResourceView::new(client.clone(), kind, scope);
    match interval {
        Some(secs) => view.start_polling(Duration::from_secs(secs)),
        None => view.start_default_polling(),
    }

    view.load().await;
    print_view(&view, output);
    let mut events = client.subscribe();
    let mut shown = 1;

    loop {
        if count.is_some_and(|limit| shown >= limit) {
            return Ok(());
        }
        tokio::select! {
            event = events.recv() => match event {
                Ok(CacheEvent::Updated(key)) if key == view.key() => {
                    print_view(&view, output);
                    shown += 1;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "watch lagged"),
                Err(RecvError::Closed) => return Ok(()),
            },
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
    }
}
