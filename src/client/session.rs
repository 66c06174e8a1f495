//! Interactive terminal session supervision.
//!
//! After the pty is up and the callback commands have been typed, three
//! tasks share the remote shell: input forwarding, resize polling and
//! keepalive. They stop together when the shell reports completion.

use crate::config::CallbackShell;
use crate::constants::network::KEEPALIVE_INTERVAL_MS;
use crate::constants::terminal::{PTY_BAUD, PTY_TERM, RESIZE_POLL_MS};
use crate::errors::ClientError;
use crate::services::logger::Logger;
use crate::utils::terminal::{LocalTerminal, TermSize};
use async_trait::async_trait;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PtyRequest {
    pub term: String,
    pub size: TermSize,
    pub echo: bool,
    pub ispeed: u32,
    pub ospeed: u32,
}

impl PtyRequest {
    pub fn xterm(size: TermSize) -> Self {
        Self {
            term: PTY_TERM.to_string(),
            size,
            echo: true,
            ispeed: PTY_BAUD,
            ospeed: PTY_BAUD,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShellExit {
    pub status: i32,
}

/// A started remote shell whose output is already wired to the local terminal.
#[async_trait]
pub trait RemoteShell: Send + Sync + 'static {
    fn write_input(&self, data: &[u8]) -> io::Result<()>;
    fn window_change(&self, size: TermSize) -> Result<(), ClientError>;
    fn keepalive(&self) -> Result<(), ClientError>;
    fn close(&self);
    async fn wait(&self) -> Result<ShellExit, ClientError>;
}

pub trait ShellOpener {
    type Shell: RemoteShell;

    /// Opens a channel, requests the pty and starts the shell.
    fn open_shell(&self, request: &PtyRequest) -> Result<Self::Shell, ClientError>;
}

pub struct SessionSupervisor<T: LocalTerminal> {
    logger: Logger,
    terminal: Arc<T>,
    resize_interval: Duration,
    keepalive_interval: Duration,
}

impl<T: LocalTerminal> SessionSupervisor<T> {
    pub fn new(logger: Logger, terminal: Arc<T>) -> Self {
        Self {
            logger: logger.child("session"),
            terminal,
            resize_interval: Duration::from_millis(RESIZE_POLL_MS),
            keepalive_interval: Duration::from_millis(KEEPALIVE_INTERVAL_MS),
        }
    }

    fn fail(&self, message: &str, err: ClientError) -> ClientError {
        self.logger.error(
            message,
            Some(&serde_json::json!({ "error": err.to_string() })),
        );
        err
    }

    /// Runs one interactive session to completion. The local terminal is in
    /// raw mode for the duration and restored on every return path.
    pub async fn run<O, R>(
        &self,
        opener: &O,
        input: R,
        callbacks: &[CallbackShell],
        command: Option<&str>,
    ) -> Result<ShellExit, ClientError>
    where
        O: ShellOpener,
        R: AsyncRead + Unpin + Send + 'static,
    {
        let _raw = self.terminal.enter_raw_mode().map_err(|err| {
            self.fail(
                "failed to enter raw mode",
                ClientError::session(err.to_string()),
            )
        })?;
        let size = self.terminal.size().map_err(|err| {
            self.fail(
                "failed to query terminal size",
                ClientError::session(err.to_string()),
            )
        })?;
        let shell = opener
            .open_shell(&PtyRequest::xterm(size))
            .map_err(|err| self.fail("failed to start remote shell", err))?;
        self.supervise(Arc::new(shell), size, input, callbacks, command)
            .await
    }

    async fn prime<S: RemoteShell>(
        &self,
        shell: &Arc<S>,
        callbacks: &[CallbackShell],
        command: Option<&str>,
    ) -> io::Result<()> {
        for callback in callbacks {
            tokio::time::sleep(callback.delay()).await;
            write_line(shell, &callback.cmd).await?;
        }
        if let Some(command) = command.filter(|c| !c.is_empty()) {
            write_line(shell, command).await?;
            write_line(shell, "exit").await?;
        }
        Ok(())
    }

    pub async fn supervise<S, R>(
        &self,
        shell: Arc<S>,
        size: TermSize,
        input: R,
        callbacks: &[CallbackShell],
        command: Option<&str>,
    ) -> Result<ShellExit, ClientError>
    where
        S: RemoteShell,
        R: AsyncRead + Unpin + Send + 'static,
    {
        if let Err(err) = self.prime(&shell, callbacks, command).await {
            offload(&shell, |shell| shell.close()).await;
            return Err(self.fail(
                "failed to write callback commands",
                ClientError::session(err.to_string()),
            ));
        }

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let tasks = [
            tokio::spawn(forward_input(
                shell.clone(),
                input,
                cancel_rx.clone(),
                self.logger.child("input"),
            )),
            tokio::spawn(watch_resize(
                shell.clone(),
                self.terminal.clone(),
                size,
                self.resize_interval,
                cancel_rx.clone(),
            )),
            tokio::spawn(keep_alive(shell.clone(), self.keepalive_interval, cancel_rx)),
        ];

        let outcome = shell.wait().await;
        let _ = cancel_tx.send(true);
        for task in tasks {
            let _ = task.await;
        }
        offload(&shell, |shell| shell.close()).await;

        match &outcome {
            Ok(exit) => self.logger.debug(
                "remote shell exited",
                Some(&serde_json::json!({ "status": exit.status })),
            ),
            Err(err) => self.logger.error(
                "remote shell failed",
                Some(&serde_json::json!({ "error": err.to_string() })),
            ),
        }
        outcome
    }
}

/// Runs a shell call on the blocking pool; libssh2 calls may wait on the
/// channel lock or retry on EAGAIN. `None` means the blocking task panicked.
async fn offload<S, T, F>(shell: &Arc<S>, op: F) -> Option<T>
where
    S: RemoteShell,
    T: Send + 'static,
    F: FnOnce(&S) -> T + Send + 'static,
{
    let shell = shell.clone();
    tokio::task::spawn_blocking(move || op(shell.as_ref()))
        .await
        .ok()
}

async fn write_input<S: RemoteShell>(shell: &Arc<S>, data: Vec<u8>) -> io::Result<()> {
    offload(shell, move |shell| shell.write_input(&data))
        .await
        .unwrap_or_else(|| Err(io::Error::new(io::ErrorKind::Other, "input writer panicked")))
}

async fn write_line<S: RemoteShell>(shell: &Arc<S>, line: &str) -> io::Result<()> {
    write_input(shell, format!("{}\r", line).into_bytes()).await
}

async fn forward_input<S, R>(
    shell: Arc<S>,
    mut input: R,
    mut cancel: watch::Receiver<bool>,
    logger: Logger,
) where
    S: RemoteShell,
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut buf = vec![0u8; 4096];
    loop {
        tokio::select! {
            _ = cancel.changed() => return,
            read = input.read(&mut buf) => match read {
                Ok(0) => break,
                Ok(n) => {
                    if let Err(err) = write_input(&shell, buf[..n].to_vec()).await {
                        logger.debug(
                            "remote input closed",
                            Some(&serde_json::json!({ "error": err.to_string() })),
                        );
                        break;
                    }
                }
                Err(err) => {
                    logger.debug(
                        "local input failed",
                        Some(&serde_json::json!({ "error": err.to_string() })),
                    );
                    break;
                }
            },
        }
    }
    // Local input is done; closing the session releases `wait`.
    offload(&shell, |shell| shell.close()).await;
}

async fn watch_resize<S, T>(
    shell: Arc<S>,
    terminal: Arc<T>,
    initial: TermSize,
    period: Duration,
    mut cancel: watch::Receiver<bool>,
) where
    S: RemoteShell,
    T: LocalTerminal,
{
    let mut last = initial;
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.changed() => return,
            _ = ticker.tick() => {
                let Ok(size) = terminal.size() else {
                    return;
                };
                if size == last {
                    continue;
                }
                let changed = offload(&shell, move |shell| shell.window_change(size)).await;
                if !matches!(changed, Some(Ok(()))) {
                    return;
                }
                last = size;
            }
        }
    }
}

async fn keep_alive<S: RemoteShell>(
    shell: Arc<S>,
    period: Duration,
    mut cancel: watch::Receiver<bool>,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.changed() => return,
            _ = ticker.tick() => {
                let _ = offload(&shell, |shell| shell.keepalive()).await;
            }
        }
    }
}
