pub mod auth;
pub mod connect;
pub mod session;
pub mod shell;
pub mod transfer;
pub mod transport;

pub use auth::{ClientConfig, Prompter, TerminalPrompter};
pub use connect::{Connected, ConnectionBuilder, Dialer};
pub use session::{PtyRequest, RemoteShell, SessionSupervisor, ShellExit, ShellOpener};
pub use shell::Ssh2Shell;
pub use transfer::{FileTransport, RemoteFs, TransferReport, TransferRunner};
pub use transport::{Ssh2Dialer, SshConnection};
