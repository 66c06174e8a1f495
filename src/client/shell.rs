//! libssh2-backed interactive shell.

use super::session::{PtyRequest, RemoteShell, ShellExit, ShellOpener};
use super::transport::{would_block, SshConnection};
use crate::constants::network::{
    LIBSSH2_ERROR_EAGAIN, PUMP_BUFFER_SIZE, PUMP_IDLE_SLEEP_MS, TIMEOUT_SSH_READY_MS,
};
use crate::errors::{map_ssh_error, ClientError, ClientErrorKind};
use crate::services::logger::Logger;
use crate::utils::terminal::TermSize;
use async_trait::async_trait;
use ssh2::{Channel, ErrorCode, PtyModeOpcode, PtyModes, Session};
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::watch;

type ExitState = Option<Result<ShellExit, String>>;

pub struct Ssh2Shell {
    session: Session,
    channel: Arc<Mutex<Channel>>,
    closed: Arc<AtomicBool>,
    exit: watch::Receiver<ExitState>,
}

impl ShellOpener for SshConnection {
    type Shell = Ssh2Shell;

    fn open_shell(&self, request: &PtyRequest) -> Result<Ssh2Shell, ClientError> {
        let session_err = |err| map_ssh_error(ClientErrorKind::Session, err);
        let mut channel = self.session.channel_session().map_err(session_err)?;
        let mut modes = PtyModes::new();
        modes.set_boolean(PtyModeOpcode::ECHO, request.echo);
        modes.set_u32(PtyModeOpcode::TTY_OP_ISPEED, request.ispeed);
        modes.set_u32(PtyModeOpcode::TTY_OP_OSPEED, request.ospeed);
        channel
            .request_pty(
                &request.term,
                Some(modes),
                Some((u32::from(request.size.cols), u32::from(request.size.rows), 0, 0)),
            )
            .map_err(session_err)?;
        channel.shell().map_err(session_err)?;
        Ssh2Shell::spawn(self.session.clone(), channel, self.logger.child("shell"))
    }
}

impl Ssh2Shell {
    fn spawn(session: Session, channel: Channel, logger: Logger) -> Result<Self, ClientError> {
        session.set_blocking(false);
        let channel = Arc::new(Mutex::new(channel));
        let closed = Arc::new(AtomicBool::new(false));
        let (exit_tx, exit_rx) = watch::channel(None);

        let pump_channel = channel.clone();
        std::thread::Builder::new()
            .name("sshw-shell".to_string())
            .spawn(move || {
                let outcome = pump_output(&pump_channel, &logger);
                let _ = exit_tx.send(Some(outcome));
            })
            .map_err(|err| ClientError::session(format!("failed to start shell pump: {}", err)))?;

        Ok(Self {
            session,
            channel,
            closed,
            exit: exit_rx,
        })
    }

    fn lock(&self) -> io::Result<MutexGuard<'_, Channel>> {
        self.channel
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "shell channel poisoned"))
    }
}

fn is_eagain(err: &ssh2::Error) -> bool {
    err.code() == ErrorCode::Session(LIBSSH2_ERROR_EAGAIN)
}

/// Repeats a non-blocking libssh2 call until it stops reporting EAGAIN.
fn retry_would_block<T>(
    mut op: impl FnMut() -> Result<T, ssh2::Error>,
) -> Result<T, ssh2::Error> {
    let deadline = Instant::now() + Duration::from_millis(TIMEOUT_SSH_READY_MS);
    loop {
        match op() {
            Err(err) if Instant::now() < deadline && is_eagain(&err) => {
                std::thread::sleep(Duration::from_millis(PUMP_IDLE_SLEEP_MS));
            }
            other => return other,
        }
    }
}

#[async_trait]
impl RemoteShell for Ssh2Shell {
    fn write_input(&self, data: &[u8]) -> io::Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "shell closed"));
        }
        let mut offset = 0;
        while offset < data.len() {
            let written = self.lock()?.write(&data[offset..]);
            match written {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "shell channel closed",
                    ))
                }
                Ok(n) => offset += n,
                Err(err) if would_block(&err) => {
                    std::thread::sleep(Duration::from_millis(PUMP_IDLE_SLEEP_MS));
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    fn window_change(&self, size: TermSize) -> Result<(), ClientError> {
        let mut channel = self.lock()?;
        retry_would_block(|| {
            channel.request_pty_size(u32::from(size.cols), u32::from(size.rows), None, None)
        })
        .map_err(|err| map_ssh_error(ClientErrorKind::Session, err))
    }

    fn keepalive(&self) -> Result<(), ClientError> {
        retry_would_block(|| self.session.keepalive_send())
            .map(|_| ())
            .map_err(|err| map_ssh_error(ClientErrorKind::Session, err))
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Ok(mut channel) = self.lock() {
            let _ = retry_would_block(|| channel.close());
        }
    }

    async fn wait(&self) -> Result<ShellExit, ClientError> {
        let mut exit = self.exit.clone();
        loop {
            if let Some(outcome) = exit.borrow().clone() {
                return outcome.map_err(ClientError::session);
            }
            if exit.changed().await.is_err() {
                return Err(ClientError::session("shell pump stopped without reporting"));
            }
        }
    }
}

/// Copies remote stdout and stderr to the local terminal until the channel
/// reaches EOF, then collects the exit status.
fn pump_output(channel: &Mutex<Channel>, logger: &Logger) -> Result<ShellExit, String> {
    let mut out_buf = vec![0u8; PUMP_BUFFER_SIZE];
    let mut err_buf = vec![0u8; PUMP_BUFFER_SIZE];
    let mut stdout = io::stdout();
    let mut stderr = io::stderr();
    loop {
        // The channel lock is held only for the reads; local writes can block
        // on a paused terminal and must not stall input or resize requests.
        let (out_len, err_len, eof) = {
            let mut guard = channel
                .lock()
                .map_err(|_| "shell channel poisoned".to_string())?;
            let out_len = match guard.read(&mut out_buf) {
                Ok(n) => n,
                Err(err) if would_block(&err) => 0,
                Err(err) => return Err(format!("shell stdout read failed: {}", err)),
            };
            let err_len = match guard.stderr().read(&mut err_buf) {
                Ok(n) => n,
                Err(err) if would_block(&err) => 0,
                Err(err) => return Err(format!("shell stderr read failed: {}", err)),
            };
            (out_len, err_len, guard.eof())
        };
        if out_len > 0 {
            let _ = stdout.write_all(&out_buf[..out_len]);
            let _ = stdout.flush();
        }
        if err_len > 0 {
            let _ = stderr.write_all(&err_buf[..err_len]);
            let _ = stderr.flush();
        }
        if eof {
            break;
        }
        if out_len == 0 && err_len == 0 {
            std::thread::sleep(Duration::from_millis(PUMP_IDLE_SLEEP_MS));
        }
    }

    let mut guard = channel.lock().map_err(|_| "shell channel poisoned".to_string())?;
    let _ = retry_would_block(|| guard.wait_close());
    let status = guard.exit_status().unwrap_or(-1);
    logger.debug(
        "shell channel closed",
        Some(&serde_json::json!({ "status": status })),
    );
    Ok(ShellExit { status })
}
