//! Paced outgoing command queue.
//!
//! The sensor firmware drops or corrupts commands that arrive closer than
//! 350 ms apart, so every outgoing command - bootstrap batches, user sets,
//! raw passthrough - funnels through this single queue, which enforces the
//! minimum gap globally rather than per batch. Callers cannot bypass it:
//! the session holds no other path to the link's send side.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::metrics;
use crate::transport::{LinkCommand, LinkCommandTx};

use super::state::{log_event, LogDirection, SharedLog};

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Minimum spacing between transmissions. The firmware floor is 350 ms;
    /// config can only raise this.
    pub min_gap: Duration,
    /// Demo mode: log outgoing commands, transmit nothing.
    pub demo: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        DispatcherConfig { min_gap: Duration::from_millis(350), demo: false }
    }
}

enum DispatchCommand {
    Enqueue(String),
    EnqueueBatch(Vec<String>),
    ClearPending,
    Shutdown(oneshot::Sender<()>),
}

#[derive(Clone)]
pub struct DispatcherHandle {
    tx: mpsc::UnboundedSender<DispatchCommand>,
}

impl DispatcherHandle {
    /// Queue a single command for paced transmission.
    pub fn send(&self, command: impl Into<String>) {
        let _ = self.tx.send(DispatchCommand::Enqueue(command.into()));
    }

    /// Queue an ordered batch. Spacing between its members (and against any
    /// other queued traffic) is enforced inside the dispatcher.
    pub fn send_batch(&self, commands: Vec<String>) {
        let _ = self.tx.send(DispatchCommand::EnqueueBatch(commands));
    }

    /// Drop anything not yet transmitted (disconnect teardown).
    pub fn clear_pending(&self) {
        let _ = self.tx.send(DispatchCommand::ClearPending);
    }

    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        let _ = self.tx.send(DispatchCommand::Shutdown(tx));
        let _ = rx.await;
    }
}

/// Spawn the dispatcher task. Commands flow out through `link` as
/// [`LinkCommand::Send`] with a CR/LF terminator appended when absent.
pub fn start_dispatcher(cfg: DispatcherConfig, link: LinkCommandTx, log: SharedLog) -> DispatcherHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<DispatchCommand>();
    let handle = DispatcherHandle { tx };

    tokio::spawn(async move {
        let mut queue: VecDeque<String> = VecDeque::new();
        let mut last_sent: Option<Instant> = None;
        loop {
            // Sleep until the head of the queue is allowed out, or forever
            // when idle (a recv wakes us).
            let next_ready = match (queue.front(), last_sent) {
                (Some(_), Some(last)) => Some(last + cfg.min_gap),
                (Some(_), None) => Some(Instant::now()),
                (None, _) => None,
            };
            tokio::select! {
                cmd = rx.recv() => {
                    match cmd {
                        Some(DispatchCommand::Enqueue(c)) => queue.push_back(c),
                        Some(DispatchCommand::EnqueueBatch(batch)) => queue.extend(batch),
                        Some(DispatchCommand::ClearPending) => queue.clear(),
                        Some(DispatchCommand::Shutdown(done)) => { let _ = done.send(()); break; }
                        None => break,
                    }
                }
                _ = async {
                    match next_ready {
                        Some(at) => tokio::time::sleep_until(at).await,
                        None => std::future::pending().await,
                    }
                } => {
                    if let Some(command) = queue.pop_front() {
                        transmit(&cfg, &link, &log, command);
                        last_sent = Some(Instant::now());
                    }
                }
            }
        }
        log::debug!("dispatcher loop terminated");
    });

    handle
}

fn transmit(cfg: &DispatcherConfig, link: &LinkCommandTx, log: &SharedLog, command: String) {
    let trimmed = command.trim_end().to_string();
    log_event(log, LogDirection::Tx, trimmed.clone());
    log::debug!("TX {}", trimmed);
    metrics::inc_commands_sent();
    if cfg.demo {
        return;
    }
    let wire = if command.ends_with("\r\n") {
        command
    } else {
        format!("{}\r\n", trimmed)
    };
    if link.send(LinkCommand::Send(wire.into_bytes())).is_err() {
        metrics::inc_send_failures();
        log_event(log, LogDirection::Error, "send failed: link closed");
        log::warn!("link command channel closed; dropping outgoing command");
    }
}
