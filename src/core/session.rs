//! Session spawning and child supervision
//!
//! Spawns the child on a fresh pty from a worker thread and reports back
//! over a channel: exactly one spawn completion, a stream of output
//! chunks, then one exit notice. The event loop polls without blocking;
//! a deadline turns an unresponsive spawn into a failure completion.

use std::io::{Read, Write};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::core::command::SpawnPlan;

/// Upper bound on how long the spawn primitive may take.
pub const SPAWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Spawn failure shapes. All of them resolve to the same fate: the host
/// exits with a neutral status, no retry.
#[derive(Error, Debug)]
pub enum SpawnError {
    #[error("failed to open pty: {0}")]
    OpenPty(anyhow::Error),
    #[error("failed to spawn `{command}`: {cause}")]
    Spawn {
        command: String,
        cause: anyhow::Error,
    },
    #[error("pty pipes unavailable: {0}")]
    Pipes(anyhow::Error),
    #[error("spawn did not complete within {0:?}")]
    TimedOut(Duration),
}

/// Live pty parts handed to the terminal widget on spawn success.
pub struct SessionIo {
    /// Master side, kept for resizes and descriptor queries.
    pub master: Box<dyn MasterPty + Send>,
    /// Writer for keyboard input.
    pub writer: Box<dyn Write + Send>,
    /// Child output chunks from the reader thread.
    pub output_rx: Receiver<Vec<u8>>,
}

/// Notifications delivered to the event loop.
pub enum SessionNotice {
    /// Single-shot spawn completion: child pid plus live I/O, or failure.
    Spawned(Result<(i32, SessionIo), SpawnError>),
    /// Child terminated with this exit status.
    Exited(i32),
}

/// Handle to the in-flight session, owned by the event loop.
pub struct Session {
    notice_rx: Receiver<SessionNotice>,
    deadline: Instant,
    spawn_resolved: bool,
}

impl Session {
    /// Request the asynchronous spawn. Never blocks; the completion
    /// arrives as the first notice from `poll`.
    ///
    /// The child sees only the passed environment (the builder's
    /// environment is cleared first), and the executable is resolved
    /// against the `PATH` of that same environment.
    pub fn spawn(plan: SpawnPlan, env: Vec<(String, String)>, rows: u16, cols: u16) -> Session {
        let (notice_tx, notice_rx) = mpsc::channel();

        thread::spawn(move || {
            let (pid, io, mut child) = match open_and_spawn(&plan, &env, rows, cols) {
                Ok(parts) => parts,
                Err(err) => {
                    error!("{}", err);
                    let _ = notice_tx.send(SessionNotice::Spawned(Err(err)));
                    return;
                }
            };
            info!("spawned `{}` (pid {})", plan.argv.join(" "), pid);
            if notice_tx.send(SessionNotice::Spawned(Ok((pid, io)))).is_err() {
                return;
            }

            // Blocks this thread until the child is gone; the loop keeps
            // polling meanwhile.
            let status = match child.wait() {
                Ok(status) => status.exit_code() as i32,
                Err(err) => {
                    error!("wait on child failed: {}", err);
                    0
                }
            };
            let _ = notice_tx.send(SessionNotice::Exited(status));
        });

        Session {
            notice_rx,
            deadline: Instant::now() + SPAWN_TIMEOUT,
            spawn_resolved: false,
        }
    }

    /// Non-blocking notice poll. A missed spawn deadline is converted
    /// into the failure completion, exactly once; a completion arriving
    /// after that is discarded.
    pub fn poll(&mut self) -> Option<SessionNotice> {
        match self.notice_rx.try_recv() {
            Ok(SessionNotice::Spawned(result)) => {
                if self.spawn_resolved {
                    debug!("late spawn completion discarded");
                    return None;
                }
                self.spawn_resolved = true;
                Some(SessionNotice::Spawned(result))
            }
            Ok(notice) => Some(notice),
            Err(_) => {
                if !self.spawn_resolved && Instant::now() >= self.deadline {
                    self.spawn_resolved = true;
                    return Some(SessionNotice::Spawned(Err(SpawnError::TimedOut(
                        SPAWN_TIMEOUT,
                    ))));
                }
                None
            }
        }
    }
}

type SpawnParts = (i32, SessionIo, Box<dyn Child + Send + Sync>);

fn open_and_spawn(
    plan: &SpawnPlan,
    env: &[(String, String)],
    rows: u16,
    cols: u16,
) -> Result<SpawnParts, SpawnError> {
    let pty_system = native_pty_system();
    let pair = pty_system
        .openpty(PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        })
        .map_err(SpawnError::OpenPty)?;

    let mut cmd = CommandBuilder::new(&plan.argv[0]);
    cmd.args(&plan.argv[1..]);
    cmd.cwd(&plan.cwd);
    cmd.env_clear();
    for (key, value) in env {
        cmd.env(key, value);
    }

    let child = pair.slave.spawn_command(cmd).map_err(|cause| SpawnError::Spawn {
        command: plan.argv.join(" "),
        cause,
    })?;
    // The slave side belongs to the child now.
    drop(pair.slave);

    let pid = child.process_id().map(|pid| pid as i32).unwrap_or(-1);

    let mut reader = pair.master.try_clone_reader().map_err(SpawnError::Pipes)?;
    let writer = pair.master.take_writer().map_err(SpawnError::Pipes)?;

    let (output_tx, output_rx) = mpsc::channel::<Vec<u8>>();
    thread::spawn(move || {
        let mut buffer = vec![0u8; 4096];
        loop {
            match reader.read(&mut buffer) {
                // EOF, pty closed on the child side
                Ok(0) => break,
                Ok(n) => {
                    if output_tx.send(buffer[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
        debug!("pty reader finished");
    });

    Ok((
        pid,
        SessionIo {
            master: pair.master,
            writer,
            output_rx,
        },
        child,
    ))
}
