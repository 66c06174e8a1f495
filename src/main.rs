use sshw::app::App;
use sshw::cli::Cli;

#[tokio::main]
async fn main() {
    let cli = match Cli::parse_args(std::env::args()) {
        Ok(cli) => cli,
        Err(err) => err.exit(),
    };
    let code = App::new().run(cli).await;
    // A pending stdin read on the blocking pool would otherwise keep the runtime alive.
    std::process::exit(code);
}
