//! libssh2-backed transport: dialing, authentication and the jump tunnel.

use super::auth::{AuthMethod, ChallengeResponder, ClientConfig, Prompter};
use super::connect::{Connected, Dialer};
use crate::constants::network::{KEEPALIVE_INTERVAL_MS, PUMP_BUFFER_SIZE, PUMP_IDLE_SLEEP_MS};
use crate::errors::{map_ssh_error, ClientError, ClientErrorKind};
use crate::services::logger::Logger;
use ssh2::{Channel, MethodType, Session};
use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

pub struct SshConnection {
    pub(crate) session: Session,
    pub(crate) logger: Logger,
    // Keeps the jump host session and its pump alive for tunnelled connections.
    _tunnel: Option<TunnelPump>,
}

impl SshConnection {
    pub fn close(&self) {
        let _ = self.session.disconnect(None, "bye", None);
    }
}

impl Connected for SshConnection {
    fn server_version(&self) -> String {
        self.session.banner().unwrap_or("unknown").to_string()
    }
}

/// Loopback end of a `direct-tcpip` channel opened on a jump host.
pub struct TunnelStream {
    stream: TcpStream,
    pump: TunnelPump,
}

struct TunnelPump {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Drop for TunnelPump {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

pub struct Ssh2Dialer {
    logger: Logger,
    prompter: Arc<dyn Prompter>,
}

impl Ssh2Dialer {
    pub fn new(logger: Logger, prompter: Arc<dyn Prompter>) -> Self {
        Self {
            logger: logger.child("transport"),
            prompter,
        }
    }

    fn tcp_connect(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<TcpStream, ClientError> {
        let addrs = (host, port)
            .to_socket_addrs()
            .map_err(|err| {
                ClientError::dial(format!("Failed to resolve {}:{}: {}", host, port, err))
            })?;
        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => return Ok(stream),
                Err(err) => last_err = Some(err),
            }
        }
        let reason = last_err
            .map(|err| err.to_string())
            .unwrap_or_else(|| "no addresses".to_string());
        Err(ClientError::dial(format!(
            "Failed to connect SSH {}:{}: {}",
            host, port, reason
        )))
    }

    fn establish(&self, tcp: TcpStream, config: &ClientConfig) -> Result<Session, ClientError> {
        let dial_err = |err| map_ssh_error(ClientErrorKind::Dial, err);
        let mut session = Session::new().map_err(dial_err)?;
        session.set_timeout(config.timeout.as_millis() as u32);
        let ciphers = config.cipher_pref();
        session
            .method_pref(MethodType::CryptCs, &ciphers)
            .map_err(dial_err)?;
        session
            .method_pref(MethodType::CryptSc, &ciphers)
            .map_err(dial_err)?;
        session.set_tcp_stream(tcp);
        session.handshake().map_err(dial_err)?;
        self.authenticate(&session, config)?;
        // Only the dial is time-bounded.
        session.set_timeout(0);
        session.set_keepalive(false, (KEEPALIVE_INTERVAL_MS / 1000) as u32);
        Ok(session)
    }

    fn authenticate(&self, session: &Session, config: &ClientConfig) -> Result<(), ClientError> {
        let offered = match session.auth_methods(&config.user) {
            Ok(methods) => methods.split(',').map(str::to_string).collect::<Vec<_>>(),
            Err(_) if session.authenticated() => return Ok(()),
            Err(err) => return Err(map_ssh_error(ClientErrorKind::Dial, err)),
        };
        let mut attempted = vec!["none"];
        for method in &config.auth {
            if session.authenticated() {
                break;
            }
            if !offered.iter().any(|m| m == method.name()) {
                continue;
            }
            attempted.push(method.name());
            let result = match method {
                AuthMethod::PublicKey(signer) => session.userauth_pubkey_memory(
                    &config.user,
                    None,
                    &signer.private_key,
                    signer.passphrase.as_deref(),
                ),
                AuthMethod::Password(password) => session.userauth_password(&config.user, password),
                AuthMethod::KeyboardInteractive => {
                    let mut responder = ChallengeResponder::new(self.prompter.as_ref());
                    session.userauth_keyboard_interactive(&config.user, &mut responder)
                }
            };
            if let Err(err) = result {
                self.logger.debug(
                    "auth method rejected",
                    Some(&serde_json::json!({ "method": method.name(), "error": err.to_string() })),
                );
            }
        }
        if session.authenticated() {
            return Ok(());
        }
        Err(ClientError::dial(format!(
            "ssh: unable to authenticate, attempted methods [{}], no supported methods remain",
            attempted.join(" ")
        )))
    }
}

impl Dialer for Ssh2Dialer {
    type Conn = SshConnection;
    type Tunnel = TunnelStream;

    fn dial(
        &self,
        host: &str,
        port: u16,
        config: &ClientConfig,
    ) -> Result<SshConnection, ClientError> {
        let tcp = self.tcp_connect(host, port, config.timeout)?;
        let session = self.establish(tcp, config)?;
        Ok(SshConnection {
            session,
            logger: self.logger.child("connection"),
            _tunnel: None,
        })
    }

    fn open_tunnel(
        &self,
        via: &SshConnection,
        host: &str,
        port: u16,
    ) -> Result<TunnelStream, ClientError> {
        let channel = via
            .session
            .channel_direct_tcpip(host, port, None)
            .map_err(|err| map_ssh_error(ClientErrorKind::Dial, err))?;
        let setup_err = |err: io::Error| ClientError::dial(format!("tunnel setup failed: {}", err));
        // libssh2 needs a real socket, so bridge the channel through a loopback pair.
        let listener = TcpListener::bind("127.0.0.1:0").map_err(setup_err)?;
        let addr = listener.local_addr().map_err(setup_err)?;
        let stream = TcpStream::connect(addr).map_err(setup_err)?;
        let (local, _) = listener.accept().map_err(setup_err)?;
        local.set_nonblocking(true).map_err(setup_err)?;

        let stop = Arc::new(AtomicBool::new(false));
        let session = via.session.clone();
        let logger = self.logger.child("tunnel");
        let flag = stop.clone();
        let handle = std::thread::Builder::new()
            .name("sshw-tunnel".to_string())
            .spawn(move || pump_tunnel(session, channel, local, flag, logger))
            .map_err(setup_err)?;
        Ok(TunnelStream {
            stream,
            pump: TunnelPump {
                stop,
                handle: Some(handle),
            },
        })
    }

    fn handshake(
        &self,
        tunnel: TunnelStream,
        _host: &str,
        _port: u16,
        config: &ClientConfig,
    ) -> Result<SshConnection, ClientError> {
        let TunnelStream { stream, pump } = tunnel;
        let session = self.establish(stream, config)?;
        Ok(SshConnection {
            session,
            logger: self.logger.child("connection"),
            _tunnel: Some(pump),
        })
    }
}

pub(crate) fn would_block(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
}

/// Moves bytes between the jump host channel and the loopback socket until
/// either side closes or the pump is stopped.
fn pump_tunnel(
    session: Session,
    mut channel: Channel,
    mut local: TcpStream,
    stop: Arc<AtomicBool>,
    logger: Logger,
) {
    session.set_blocking(false);
    let mut buf = vec![0u8; PUMP_BUFFER_SIZE];
    let mut to_local: Vec<u8> = Vec::new();
    let mut to_remote: Vec<u8> = Vec::new();
    let mut local_eof = false;

    let outcome: io::Result<()> = (|| {
        while !stop.load(Ordering::SeqCst) {
            let mut progressed = false;

            if to_local.is_empty() {
                match channel.read(&mut buf) {
                    Ok(0) => {}
                    Ok(n) => {
                        to_local.extend_from_slice(&buf[..n]);
                        progressed = true;
                    }
                    Err(err) if would_block(&err) => {}
                    Err(err) => return Err(err),
                }
            }
            if !to_local.is_empty() {
                match local.write(&to_local) {
                    Ok(n) => {
                        to_local.drain(..n);
                        progressed = true;
                    }
                    Err(err) if would_block(&err) => {}
                    Err(err) => return Err(err),
                }
            }

            if to_remote.is_empty() && !local_eof {
                match local.read(&mut buf) {
                    Ok(0) => {
                        local_eof = true;
                        let _ = channel.send_eof();
                    }
                    Ok(n) => {
                        to_remote.extend_from_slice(&buf[..n]);
                        progressed = true;
                    }
                    Err(err) if would_block(&err) => {}
                    Err(err) => return Err(err),
                }
            }
            if !to_remote.is_empty() {
                match channel.write(&to_remote) {
                    Ok(n) => {
                        to_remote.drain(..n);
                        progressed = true;
                    }
                    Err(err) if would_block(&err) => {}
                    Err(err) => return Err(err),
                }
            }

            if channel.eof() && to_local.is_empty() {
                return Ok(());
            }
            if local_eof && to_remote.is_empty() {
                return Ok(());
            }
            if !progressed {
                std::thread::sleep(Duration::from_millis(PUMP_IDLE_SLEEP_MS));
            }
        }
        Ok(())
    })();

    if let Err(err) = outcome {
        logger.debug(
            "tunnel closed with error",
            Some(&serde_json::json!({ "error": err.to_string() })),
        );
    }
    let _ = local.shutdown(std::net::Shutdown::Both);
    let _ = channel.close();
}
