use crate::cli::{version_text, Action, Cli};
use crate::client::{
    ConnectionBuilder, SessionSupervisor, Ssh2Dialer, SshConnection, TerminalPrompter,
    TransferRunner,
};
use crate::config::{ConfigStore, Node};
use crate::constants::navigation::SELECT_LABEL;
use crate::errors::ClientError;
use crate::navigator::{resolve_by_name, Navigator};
use crate::services::logger::Logger;
use crate::ui::TerminalSelect;
use crate::utils::terminal::Crossterm;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;

pub struct App {
    pub logger: Logger,
}

impl App {
    pub fn new() -> Self {
        Self {
            logger: Logger::new("sshw"),
        }
    }

    fn report(&self, message: &str, err: &ClientError) {
        self.logger.error(
            message,
            Some(&serde_json::json!({ "error": err.to_string(), "code": err.code })),
        );
    }

    /// Runs one invocation and returns the process exit code.
    pub async fn run(&self, cli: Cli) -> i32 {
        if cli.version {
            println!("{}", version_text());
            return 0;
        }
        let nodes = match self.load_nodes(cli.ssh_config) {
            Ok(nodes) => nodes,
            Err(err) => {
                self.report("load config error", &err);
                return 1;
            }
        };
        let node = match self.resolve_node(nodes, cli.name.clone()).await {
            Ok(node) => node,
            Err(err) => {
                self.report("no node selected", &err);
                return 1;
            }
        };
        match self.execute(node, cli.action()).await {
            Ok(()) => 0,
            Err(_) => 1,
        }
    }

    fn load_nodes(&self, ssh_config: bool) -> Result<Vec<Node>, ClientError> {
        let mut store = ConfigStore::new(self.logger.clone());
        if ssh_config {
            store.load_ssh_config()?;
        } else {
            store.load_config()?;
        }
        Ok(store.into_nodes())
    }

    async fn resolve_node(
        &self,
        nodes: Vec<Node>,
        name: Option<String>,
    ) -> Result<Node, ClientError> {
        if let Some(name) = name {
            return resolve_by_name(&nodes, &name);
        }
        let logger = self.logger.clone();
        tokio::task::spawn_blocking(move || {
            let navigator = Navigator::new(logger, &nodes, SELECT_LABEL);
            navigator.select(&mut TerminalSelect::default()).cloned()
        })
        .await
        .map_err(|err| ClientError::cancelled(err.to_string()))?
        .ok_or_else(|| ClientError::cancelled("selection aborted"))
    }

    async fn connect(&self, node: Node) -> Result<(Node, SshConnection), ClientError> {
        let logger = self.logger.clone();
        tokio::task::spawn_blocking(move || {
            let prompter = Arc::new(TerminalPrompter);
            let dialer = Ssh2Dialer::new(logger.clone(), prompter.clone());
            let builder = ConnectionBuilder::new(logger, dialer, prompter);
            let conn = builder.connect(&node)?;
            Ok::<_, ClientError>((node, conn))
        })
        .await
        .map_err(|err| ClientError::dial(err.to_string()))?
    }

    async fn execute(&self, node: Node, action: Action) -> Result<(), ClientError> {
        let (node, conn) = self.connect(node).await?;
        let conn = Arc::new(conn);
        let outcome = match action {
            Action::Upload { src, dest } => self.transfer(conn.clone(), src, dest, true).await,
            Action::Download { src, dest } => self.transfer(conn.clone(), src, dest, false).await,
            Action::Shell { command } => {
                let supervisor = SessionSupervisor::new(self.logger.clone(), Arc::new(Crossterm));
                supervisor
                    .run(
                        conn.as_ref(),
                        tokio::io::stdin(),
                        &node.callback_shells,
                        command.as_deref(),
                    )
                    .await
                    .map(|exit| {
                        self.logger.debug(
                            "session finished",
                            Some(&serde_json::json!({ "status": exit.status })),
                        );
                    })
            }
        };
        conn.close();
        outcome
    }

    async fn transfer(
        &self,
        conn: Arc<SshConnection>,
        src: String,
        dest: String,
        upload: bool,
    ) -> Result<(), ClientError> {
        let runner = TransferRunner::new(self.logger.clone());
        let report = tokio::task::spawn_blocking(move || {
            let bar = ProgressBar::new(0);
            let template = "{bytes}/{total_bytes} [{bar:40}] {bytes_per_sec}";
            if let Ok(style) = ProgressStyle::with_template(template) {
                bar.set_style(style);
            }
            let on_progress = |done: u64, total: u64| {
                bar.set_length(total);
                bar.set_position(done);
            };
            let result = if upload {
                runner.send_file(conn.as_ref(), &src, &dest, on_progress)
            } else {
                runner.get_file(conn.as_ref(), &src, &dest, on_progress)
            };
            bar.finish_and_clear();
            result
        })
        .await
        .map_err(|err| ClientError::transfer(err.to_string()))??;
        self.logger.info(
            "transfer complete",
            Some(&serde_json::json!({
                "source": report.source,
                "destination": report.destination,
                "bytes": report.bytes,
            })),
        );
        Ok(())
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}
