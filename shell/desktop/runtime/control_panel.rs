/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Control Panel: async adapter between background producers and the
//! synchronous [`ShellApp`](crate::app::ShellApp).
//!
//! The app never runs on a worker. Workers (the request reader and the lock
//! timers) only enqueue [`QueuedCommand`]s; the control loop drains them one at
//! a time, so a timer expiry always waits behind whatever command is in
//! flight.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use vaultshell_core::{TimerScheduler, TimerSlot, TimerToken};

use crate::command::{CommandError, ShellCommand};
use crate::shell::desktop::host::ipc::decode_request_line;

/// Capacity of the command channel. Producers wait when it is full.
const COMMAND_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandSource {
    /// A request line from the presentation host.
    Host,
    LockTimer,
}

#[derive(Debug)]
pub struct QueuedCommand {
    pub command: Result<ShellCommand, CommandError>,
    /// Request id to answer. `None` for internal commands, which get no reply.
    pub reply_to: Option<Value>,
    /// When the producer enqueued it; the control loop logs the wait.
    pub queued_at: Instant,
    pub source: CommandSource,
}

impl QueuedCommand {
    pub fn request(id: Value, command: Result<ShellCommand, CommandError>) -> Self {
        Self {
            command,
            reply_to: Some(id),
            queued_at: Instant::now(),
            source: CommandSource::Host,
        }
    }

    pub fn timer_fired(token: TimerToken) -> Self {
        Self {
            command: Ok(ShellCommand::LockTimerFired(token)),
            reply_to: None,
            queued_at: Instant::now(),
            source: CommandSource::LockTimer,
        }
    }
}

/// Owns:
/// - the command `mpsc` channel (capacity [`COMMAND_CHANNEL_CAPACITY`])
/// - a root [`CancellationToken`]; cancelling it stops every worker and timer
/// - a [`JoinSet`] supervising long-lived workers
pub struct ControlPanel {
    command_tx: mpsc::Sender<QueuedCommand>,
    command_rx: mpsc::Receiver<QueuedCommand>,
    cancel: CancellationToken,
    workers: JoinSet<()>,
}

impl ControlPanel {
    pub fn new() -> Self {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        Self {
            command_tx,
            command_rx,
            cancel: CancellationToken::new(),
            workers: JoinSet::new(),
        }
    }

    pub fn sender(&self) -> mpsc::Sender<QueuedCommand> {
        self.command_tx.clone()
    }

    /// Cancelled once shutdown starts, including when the request stream ends.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the next queued command.
    pub async fn next_command(&mut self) -> Option<QueuedCommand> {
        self.command_rx.recv().await
    }

    /// Drain everything currently buffered without waiting.
    #[cfg(test)]
    pub(crate) fn drain_pending(&mut self) -> Vec<QueuedCommand> {
        let mut pending = Vec::new();
        while let Ok(queued) = self.command_rx.try_recv() {
            pending.push(queued);
        }
        pending
    }

    /// Timer scheduler whose expiries arrive as [`ShellCommand::LockTimerFired`].
    pub fn lock_timers(&self, runtime: Handle) -> LockTimerWorkers {
        LockTimerWorkers {
            tx: self.command_tx.clone(),
            root: self.cancel.clone(),
            runtime,
            armed: HashMap::new(),
        }
    }

    /// Spawn the worker that turns request lines from `input` into commands.
    ///
    /// End of input starts shutdown.
    pub fn spawn_request_reader<R>(&mut self, input: R)
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        let cancel = self.cancel.clone();
        let tx = self.command_tx.clone();
        self.workers.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {
                    log::debug!("control_panel: request reader cancelled");
                }
                _ = request_reader_worker(input, tx) => {
                    log::debug!("control_panel: request stream closed");
                    cancel.cancel();
                }
            }
        });
        log::debug!("control_panel: request reader spawned");
    }

    /// Cancel all workers and timers and wait for the workers to finish.
    pub async fn shutdown(&mut self) {
        log::debug!(
            "control_panel: shutdown requested; cancelling {} workers",
            self.workers.len()
        );
        self.cancel.cancel();
        while self.workers.join_next().await.is_some() {}
        log::debug!("control_panel: all workers joined");
    }

    #[cfg(test)]
    pub(crate) fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

impl Default for ControlPanel {
    fn default() -> Self {
        Self::new()
    }
}

async fn request_reader_worker<R>(input: R, tx: mpsc::Sender<QueuedCommand>)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                log::warn!("control_panel: failed to read request ({e})");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let (id, command) = decode_request_line(&line);
        if tx.send(QueuedCommand::request(id, command)).await.is_err() {
            log::debug!("control_panel: control loop gone; dropping request");
            break;
        }
    }
}

/// One tokio task per armed timer slot, each scoped by a child of the panel's
/// cancellation token.
pub struct LockTimerWorkers {
    tx: mpsc::Sender<QueuedCommand>,
    root: CancellationToken,
    runtime: Handle,
    armed: HashMap<TimerSlot, CancellationToken>,
}

impl TimerScheduler for LockTimerWorkers {
    fn arm(&mut self, token: TimerToken, after: Duration) {
        self.cancel(token.slot);
        let cancel = self.root.child_token();
        self.armed.insert(token.slot, cancel.clone());
        let tx = self.tx.clone();
        self.runtime.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(after) => {
                    if let Err(e) = tx.send(QueuedCommand::timer_fired(token)).await {
                        log::debug!("control_panel: lock timer expiry dropped ({e})");
                    }
                }
            }
        });
    }

    fn cancel(&mut self, slot: TimerSlot) {
        if let Some(previous) = self.armed.remove(&slot) {
            previous.cancel();
        }
    }
}
