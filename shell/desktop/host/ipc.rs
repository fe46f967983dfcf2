/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Line-delimited JSON protocol spoken with the presentation host.
//!
//! ```text
//! host  → shell   {"id": 7, "command": "bookmarks.add", "payload": {...}}
//! shell → host    {"id": 7, "result": [...]}
//! shell → host    {"id": 8, "error": "Unknown command: ..."}
//! shell → host    {"event": "overlayShown", "bounds": null}
//! ```
//!
//! Events carry no id and may arrive at any time, including after a timer
//! fires with no request outstanding.

use crossbeam_channel::Receiver;
use serde_json::{Value, json};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::app::ShellApp;
use crate::command::{CommandError, CommandResponse, ShellCommand};
use crate::shell::desktop::runtime::control_panel::{ControlPanel, QueuedCommand};
use crate::shell::desktop::runtime::events::ShellEvent;

/// Split a request line into its id (`null` when absent or unreadable) and
/// the decoded command.
pub fn decode_request_line(line: &str) -> (Value, Result<ShellCommand, CommandError>) {
    let request: Value = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => return (Value::Null, Err(CommandError::Malformed(e.to_string()))),
    };
    let id = request.get("id").cloned().unwrap_or(Value::Null);
    (id, ShellCommand::from_request(request))
}

pub fn response_line(id: Value, result: Result<CommandResponse, CommandError>) -> String {
    let message = match result {
        Ok(response) => json!({"id": id, "result": response}),
        Err(error) => json!({"id": id, "error": error.to_string()}),
    };
    message.to_string()
}

pub fn event_line(event: &ShellEvent) -> String {
    match serde_json::to_string(event) {
        Ok(line) => line,
        Err(e) => {
            log::warn!("ipc: failed to encode event ({e})");
            json!({"event": "error"}).to_string()
        }
    }
}

/// Run `queued` against `app`. Returns the reply line, if the command wants one.
pub fn dispatch(app: &mut ShellApp, queued: QueuedCommand) -> Option<String> {
    let name = queued.command.as_ref().map_or("<invalid>", ShellCommand::name);
    #[cfg(feature = "tracing")]
    let _span = tracing::debug_span!("dispatch", command = name, source = ?queued.source).entered();
    log::trace!(
        "ipc: {name} from {:?} waited {:?} in queue",
        queued.source,
        queued.queued_at.elapsed()
    );
    let result = match queued.command {
        Ok(command) => Ok(app.handle(command)),
        Err(error) => {
            log::warn!("ipc: {error}");
            Err(error)
        }
    };
    queued.reply_to.map(|id| response_line(id, result))
}

/// The single control loop. Drains the panel's command queue into `app` until
/// shutdown, writing replies and events to `output`.
pub async fn run_control_loop<W>(
    app: &mut ShellApp,
    panel: &mut ControlPanel,
    events: &Receiver<ShellEvent>,
    output: &mut W,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let shutdown = panel.shutdown_token();
    // Events raised before the loop started, e.g. during startup.
    flush_events(events, output).await?;
    loop {
        let queued = tokio::select! {
            biased;
            queued = panel.next_command() => queued,
            _ = shutdown.cancelled() => None,
        };
        let Some(queued) = queued else {
            break;
        };
        if let Some(reply) = dispatch(app, queued) {
            write_line(output, &reply).await?;
        }
        flush_events(events, output).await?;
    }
    panel.shutdown().await;
    output.flush().await
}

async fn flush_events<W>(events: &Receiver<ShellEvent>, output: &mut W) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    for event in events.try_iter() {
        write_line(output, &event_line(&event)).await?;
    }
    Ok(())
}

async fn write_line<W>(output: &mut W, line: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    output.write_all(line.as_bytes()).await?;
    output.write_all(b"\n").await?;
    output.flush().await
}
