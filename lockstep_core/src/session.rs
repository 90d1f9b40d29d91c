//! Worker thread driving a [`CycleCoordinator`] from a tick source.
//!
//! The thread owns the coordinator, the peer and the sink. Commands arrive
//! over a crossbeam channel and are drained after an edge arrives and before
//! its tick runs, so each command is either fully visible to a tick or
//! deferred to the next one.
//!
//! Each `Session` spawns exactly one thread; dropping the `Session` sends
//! `Shutdown` and joins it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel as xch;
use lockstep_traits::{BusPeer, MotorSink, TickSource};

use crate::command::Command;
use crate::coordinator::CycleCoordinator;
use crate::error::{CommandError, SyncError};
use crate::hw_error::map_hw_error;

#[derive(Debug, Clone, Copy)]
pub struct SessionCfg {
    /// Longest wait for an edge before re-checking commands.
    pub tick_timeout: Duration,
    /// Stop on its own after this many ticks.
    pub max_ticks: Option<u64>,
}

impl Default for SessionCfg {
    fn default() -> Self {
        Self {
            tick_timeout: Duration::from_millis(500),
            max_ticks: None,
        }
    }
}

/// Cloneable sender for commands into a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: xch::Sender<Command>,
}

impl SessionHandle {
    /// Queue a command for the next tick.
    pub fn send(&self, cmd: Command) -> Result<(), SyncError> {
        self.tx
            .send(cmd)
            .map_err(|_| SyncError::State("session has ended".into()))
    }
}

/// Why the worker thread left its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    Shutdown,
    TickLimit,
    Disconnected,
}

pub struct Session {
    handle: SessionHandle,
    ticks: Arc<AtomicU64>,
    rejected: xch::Receiver<CommandError>,
    join_handle: Option<JoinHandle<SessionEnd>>,
}

impl Session {
    pub fn spawn<P, S, T>(mut coordinator: CycleCoordinator<P, S>, mut ticker: T, cfg: SessionCfg) -> Self
    where
        P: BusPeer + Send + 'static,
        S: MotorSink + Send + 'static,
        T: TickSource + Send + 'static,
    {
        let (tx, rx) = xch::unbounded::<Command>();
        let (rej_tx, rej_rx) = xch::unbounded::<CommandError>();
        let ticks = Arc::new(AtomicU64::new(0));
        let ticks_clone = ticks.clone();

        let join_handle = std::thread::spawn(move || {
            let end = loop {
                match ticker.wait_edge(cfg.tick_timeout) {
                    Ok(Some(edge)) => {
                        if let Some(end) = drain(&mut coordinator, &rx, &rej_tx) {
                            break end;
                        }
                        if coordinator.on_edge(edge).is_some() {
                            let n = ticks_clone.fetch_add(1, Ordering::Relaxed) + 1;
                            if cfg.max_ticks.is_some_and(|max| n >= max) {
                                let _ = coordinator.apply(Command::Shutdown);
                                break SessionEnd::TickLimit;
                            }
                        }
                    }
                    Ok(None) => {
                        // No edge yet; keep control commands responsive anyway
                        if let Some(end) = drain(&mut coordinator, &rx, &rej_tx) {
                            break end;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %map_hw_error(&*e), "tick source failed");
                        // back off one tick timeout, still woken by commands
                        let end = match rx.recv_timeout(cfg.tick_timeout) {
                            Ok(cmd) => apply_one(&mut coordinator, cmd, &rej_tx),
                            Err(xch::RecvTimeoutError::Timeout) => None,
                            Err(xch::RecvTimeoutError::Disconnected) => {
                                let _ = coordinator.apply(Command::Shutdown);
                                Some(SessionEnd::Disconnected)
                            }
                        };
                        if let Some(end) = end.or_else(|| drain(&mut coordinator, &rx, &rej_tx)) {
                            break end;
                        }
                    }
                }
            };
            tracing::debug!(?end, "session worker exiting");
            end
        });

        Self {
            handle: SessionHandle { tx },
            ticks,
            rejected: rej_rx,
            join_handle: Some(join_handle),
        }
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub fn send(&self, cmd: Command) -> Result<(), SyncError> {
        self.handle.send(cmd)
    }

    /// Ticks run so far.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// True once the worker has left its loop.
    pub fn is_finished(&self) -> bool {
        self.join_handle
            .as_ref()
            .is_none_or(std::thread::JoinHandle::is_finished)
    }

    /// Commands the worker rejected since the last call.
    pub fn take_rejected(&self) -> Vec<CommandError> {
        self.rejected.try_iter().collect()
    }

    /// Send Shutdown and wait for the worker.
    pub fn shutdown(mut self) -> Result<SessionEnd, SyncError> {
        let _ = self.handle.send(Command::Shutdown);
        self.join_inner()
    }

    /// Wait for the worker to end on its own (tick limit or external Shutdown).
    pub fn wait(mut self) -> Result<SessionEnd, SyncError> {
        self.join_inner()
    }

    fn join_inner(&mut self) -> Result<SessionEnd, SyncError> {
        match self.join_handle.take() {
            Some(h) => h
                .join()
                .map_err(|_| SyncError::State("session worker panicked".into())),
            None => Err(SyncError::State("session already joined".into())),
        }
    }
}

/// Apply one command; `Some` when it ends the loop.
fn apply_one<P: BusPeer, S: MotorSink>(
    coordinator: &mut CycleCoordinator<P, S>,
    cmd: Command,
    rejected: &xch::Sender<CommandError>,
) -> Option<SessionEnd> {
    let shutdown = cmd == Command::Shutdown;
    if let Err(e) = coordinator.apply(cmd) {
        tracing::warn!(error = %e, "command rejected");
        let _ = rejected.send(e);
    }
    shutdown.then_some(SessionEnd::Shutdown)
}

/// Apply every pending command; `Some` when the loop must end.
fn drain<P: BusPeer, S: MotorSink>(
    coordinator: &mut CycleCoordinator<P, S>,
    rx: &xch::Receiver<Command>,
    rejected: &xch::Sender<CommandError>,
) -> Option<SessionEnd> {
    loop {
        match rx.try_recv() {
            Ok(cmd) => {
                if let Some(end) = apply_one(coordinator, cmd, rejected) {
                    return Some(end);
                }
            }
            Err(xch::TryRecvError::Empty) => return None,
            Err(xch::TryRecvError::Disconnected) => {
                let _ = coordinator.apply(Command::Shutdown);
                return Some(SessionEnd::Disconnected);
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(handle) = self.join_handle.take() {
            let _ = self.handle.send(Command::Shutdown);
            match handle.join() {
                Ok(end) => tracing::trace!(?end, "session worker joined"),
                Err(e) => tracing::warn!(?e, "session worker panicked during shutdown"),
            }
        }
    }
}
