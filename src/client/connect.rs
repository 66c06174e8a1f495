use super::auth::{build_client_config, ClientConfig, Prompter};
use crate::config::Node;
use crate::errors::ClientError;
use crate::services::logger::Logger;
use std::sync::Arc;

/// An authenticated connection.
pub trait Connected {
    fn server_version(&self) -> String;
}

/// The three transport primitives the connection protocol is composed from.
pub trait Dialer {
    type Conn: Connected;
    type Tunnel;

    /// TCP connect, handshake and authenticate.
    fn dial(&self, host: &str, port: u16, config: &ClientConfig) -> Result<Self::Conn, ClientError>;

    /// Asks an established connection to open a byte stream to `host:port`.
    fn open_tunnel(
        &self,
        via: &Self::Conn,
        host: &str,
        port: u16,
    ) -> Result<Self::Tunnel, ClientError>;

    /// Handshake and authenticate over a stream obtained from [`Dialer::open_tunnel`].
    fn handshake(
        &self,
        tunnel: Self::Tunnel,
        host: &str,
        port: u16,
        config: &ClientConfig,
    ) -> Result<Self::Conn, ClientError>;
}

pub struct ConnectionBuilder<D: Dialer> {
    logger: Logger,
    dialer: D,
    prompter: Arc<dyn Prompter>,
}

impl<D: Dialer> ConnectionBuilder<D> {
    pub fn new(logger: Logger, dialer: D, prompter: Arc<dyn Prompter>) -> Self {
        Self {
            logger: logger.child("connect"),
            dialer,
            prompter,
        }
    }

    pub fn build(&self, node: &Node) -> ClientConfig {
        build_client_config(node, &self.logger)
    }

    fn fail(&self, message: &str, node: &Node, err: ClientError) -> ClientError {
        self.logger.error(
            message,
            Some(&serde_json::json!({
                "node": node.name,
                "address": node.address(),
                "error": err.to_string(),
            })),
        );
        err
    }

    pub fn connect(&self, node: &Node) -> Result<D::Conn, ClientError> {
        let mut config = self.build(node);
        let conn = match node.jump.first() {
            Some(jump) => self.connect_via(jump, node, &config)?,
            None => self.connect_direct(node, &mut config)?,
        };
        let message = format!(
            "connect server ssh -p {} {}@{} version: {}",
            node.port(),
            config.user,
            node.host,
            conn.server_version()
        );
        self.logger.info(&message, None);
        Ok(conn)
    }

    /// One hop only: the jump node's own `jump` list is ignored.
    fn connect_via(
        &self,
        jump: &Node,
        target: &Node,
        config: &ClientConfig,
    ) -> Result<D::Conn, ClientError> {
        let jump_config = self.build(jump);
        let proxy = self
            .dialer
            .dial(&jump.host, jump.port(), &jump_config)
            .map_err(|err| self.fail("jump host dial failed", jump, err))?;
        let tunnel = self
            .dialer
            .open_tunnel(&proxy, &target.host, target.port())
            .map_err(|err| self.fail("jump host could not reach target", target, err))?;
        self.dialer
            .handshake(tunnel, &target.host, target.port(), config)
            .map_err(|err| self.fail("handshake through jump host failed", target, err))
    }

    fn connect_direct(
        &self,
        node: &Node,
        config: &mut ClientConfig,
    ) -> Result<D::Conn, ClientError> {
        let err = match self.dialer.dial(&node.host, node.port(), config) {
            Ok(conn) => return Ok(conn),
            Err(err) => err,
        };
        if !err.is_auth_exhausted_without_password() {
            return Err(self.fail("dial failed", node, err));
        }
        let prompt = format!("{}@{}'s password:", config.user, node.host);
        let password = self.prompter.read_secret(&prompt).map_err(|io_err| {
            let err = ClientError::dial(io_err.to_string());
            self.fail("failed to read password", node, err)
        })?;
        if !password.is_empty() {
            config.push_password(password);
        }
        self.dialer
            .dial(&node.host, node.port(), config)
            .map_err(|err| self.fail("dial failed after password retry", node, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Mutex;

    const REJECTED: &str =
        "ssh: unable to authenticate, attempted methods [none publickey], no supported methods remain";
    const REJECTED_PASSWORD: &str =
        "ssh: unable to authenticate, attempted methods [none password], no supported methods remain";

    #[derive(Debug, PartialEq)]
    struct FakeConn(String);

    impl Connected for FakeConn {
        fn server_version(&self) -> String {
            format!("SSH-2.0-fake {}", self.0)
        }
    }

    #[derive(Default)]
    struct FakeDialer {
        calls: Mutex<Vec<String>>,
        dial_results: Mutex<Vec<Result<(), String>>>,
        tunnel_fails: bool,
        handshake_fails: bool,
        auth_seen: Mutex<Vec<Vec<&'static str>>>,
    }

    impl FakeDialer {
        fn with_dials(results: Vec<Result<(), &str>>) -> Self {
            Self {
                dial_results: Mutex::new(
                    results
                        .into_iter()
                        .map(|r| r.map_err(str::to_string))
                        .collect(),
                ),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Dialer for FakeDialer {
        type Conn = FakeConn;
        type Tunnel = String;

        fn dial(
            &self,
            host: &str,
            port: u16,
            config: &ClientConfig,
        ) -> Result<FakeConn, ClientError> {
            self.calls.lock().unwrap().push(format!("dial {}:{}", host, port));
            self.auth_seen.lock().unwrap().push(config.method_names());
            let mut results = self.dial_results.lock().unwrap();
            let next = if results.is_empty() { Ok(()) } else { results.remove(0) };
            next.map(|_| FakeConn(host.to_string()))
                .map_err(ClientError::dial)
        }

        fn open_tunnel(
            &self,
            via: &FakeConn,
            host: &str,
            port: u16,
        ) -> Result<String, ClientError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("tunnel {} -> {}:{}", via.0, host, port));
            if self.tunnel_fails {
                return Err(ClientError::dial("administratively prohibited"));
            }
            Ok(format!("{}:{}", host, port))
        }

        fn handshake(
            &self,
            tunnel: String,
            host: &str,
            _port: u16,
            _config: &ClientConfig,
        ) -> Result<FakeConn, ClientError> {
            self.calls.lock().unwrap().push(format!("handshake {}", tunnel));
            if self.handshake_fails {
                return Err(ClientError::dial("handshake refused"));
            }
            Ok(FakeConn(host.to_string()))
        }
    }

    struct FixedPassword {
        asked: Mutex<Vec<String>>,
        answer: String,
    }

    impl FixedPassword {
        fn new(answer: &str) -> Arc<Self> {
            Arc::new(Self {
                asked: Mutex::new(Vec::new()),
                answer: answer.to_string(),
            })
        }
    }

    impl Prompter for FixedPassword {
        fn read_secret(&self, prompt: &str) -> io::Result<String> {
            self.asked.lock().unwrap().push(prompt.to_string());
            Ok(self.answer.clone())
        }

        fn read_line(&self, _prompt: &str) -> io::Result<String> {
            Ok(String::new())
        }
    }

    fn target() -> Node {
        let mut node = Node::leaf("t", "alice", "target.internal");
        node.keypath = Some("/nonexistent/sshw/key".to_string());
        node
    }

    fn with_jump(mut node: Node) -> Node {
        let mut jump = Node::leaf("j", "ops", "bastion");
        jump.port = Some(2200);
        jump.keypath = Some("/nonexistent/sshw/key".to_string());
        jump.jump = vec![Node::leaf("ignored", "x", "further")];
        node.jump = vec![jump];
        node
    }

    fn builder(dialer: FakeDialer, prompter: Arc<FixedPassword>) -> ConnectionBuilder<FakeDialer> {
        ConnectionBuilder::new(Logger::new("test"), dialer, prompter)
    }

    #[test]
    fn jump_dials_proxy_first_then_handshakes_through_it() {
        let builder = builder(FakeDialer::default(), FixedPassword::new(""));
        let conn = builder.connect(&with_jump(target())).unwrap();
        assert_eq!(conn, FakeConn("target.internal".to_string()));
        assert_eq!(
            builder.dialer.calls(),
            vec![
                "dial bastion:2200",
                "tunnel bastion -> target.internal:22",
                "handshake target.internal:22",
            ]
        );
    }

    #[test]
    fn jump_dial_failure_never_dials_target() {
        let dialer = FakeDialer::with_dials(vec![Err("connection refused")]);
        let prompter = FixedPassword::new("pw");
        let builder = builder(dialer, prompter.clone());
        assert!(builder.connect(&with_jump(target())).is_err());
        assert_eq!(builder.dialer.calls(), vec!["dial bastion:2200"]);
        assert!(prompter.asked.lock().unwrap().is_empty());
    }

    #[test]
    fn jump_auth_rejection_does_not_trigger_password_fallback() {
        let dialer = FakeDialer::with_dials(vec![Err(REJECTED)]);
        let prompter = FixedPassword::new("pw");
        let builder = builder(dialer, prompter.clone());
        assert!(builder.connect(&with_jump(target())).is_err());
        assert_eq!(builder.dialer.calls().len(), 1);
        assert!(prompter.asked.lock().unwrap().is_empty());
    }

    #[test]
    fn tunnel_failure_aborts_without_direct_dial() {
        let dialer = FakeDialer {
            tunnel_fails: true,
            ..FakeDialer::default()
        };
        let builder = builder(dialer, FixedPassword::new(""));
        let err = builder.connect(&with_jump(target())).unwrap_err();
        assert!(err.message.contains("prohibited"));
        let calls = builder.dialer.calls();
        assert_eq!(calls.len(), 2);
        assert!(!calls.iter().any(|c| c == "dial target.internal:22"));
    }

    #[test]
    fn handshake_failure_through_jump_aborts() {
        let dialer = FakeDialer {
            handshake_fails: true,
            ..FakeDialer::default()
        };
        let prompter = FixedPassword::new("pw");
        let builder = builder(dialer, prompter.clone());
        let err = builder.connect(&with_jump(target())).unwrap_err();
        assert!(err.message.contains("handshake refused"));
        assert_eq!(
            builder.dialer.calls(),
            vec![
                "dial bastion:2200",
                "tunnel bastion -> target.internal:22",
                "handshake target.internal:22",
            ]
        );
        assert!(prompter.asked.lock().unwrap().is_empty());
    }

    #[test]
    fn auth_rejection_without_password_retries_once() {
        let dialer = FakeDialer::with_dials(vec![Err(REJECTED), Ok(())]);
        let prompter = FixedPassword::new("hunter2");
        let builder = builder(dialer, prompter.clone());
        builder.connect(&target()).unwrap();

        assert_eq!(builder.dialer.calls().len(), 2);
        assert_eq!(
            *prompter.asked.lock().unwrap(),
            vec!["alice@target.internal's password:"]
        );
        let seen = builder.dialer.auth_seen.lock().unwrap();
        assert_eq!(seen[0], vec!["keyboard-interactive"]);
        assert_eq!(seen[1], vec!["keyboard-interactive", "password"]);
    }

    #[test]
    fn failed_retry_is_terminal() {
        let dialer = FakeDialer::with_dials(vec![Err(REJECTED), Err(REJECTED)]);
        let builder = builder(dialer, FixedPassword::new("wrong"));
        assert!(builder.connect(&target()).is_err());
        assert_eq!(builder.dialer.calls().len(), 2);
    }

    #[test]
    fn rejection_mentioning_password_does_not_retry() {
        let dialer = FakeDialer::with_dials(vec![Err(REJECTED_PASSWORD)]);
        let prompter = FixedPassword::new("pw");
        let builder = builder(dialer, prompter.clone());
        assert!(builder.connect(&target()).is_err());
        assert_eq!(builder.dialer.calls().len(), 1);
        assert!(prompter.asked.lock().unwrap().is_empty());
    }

    #[test]
    fn network_failure_does_not_retry() {
        let dialer = FakeDialer::with_dials(vec![Err("Failed to connect SSH: timed out")]);
        let builder = builder(dialer, FixedPassword::new("pw"));
        assert!(builder.connect(&target()).is_err());
        assert_eq!(builder.dialer.calls().len(), 1);
    }

    #[test]
    fn empty_password_retries_without_appending() {
        let dialer = FakeDialer::with_dials(vec![Err(REJECTED), Ok(())]);
        let builder = builder(dialer, FixedPassword::new(""));
        builder.connect(&target()).unwrap();
        let seen = builder.dialer.auth_seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1], vec!["keyboard-interactive"]);
    }
}
