use clap::Parser;

const SINGLE_DASH_LONG: &[&str] = &["version", "help", "put", "get"];
const DOUBLE_DASH_SHORT: &[&str] = &["c", "s", "o", "n"];
const TAKES_VALUE: &[&str] = &["c", "o", "n", "put", "get"];

#[derive(Parser, Debug, Default, Clone, PartialEq, Eq)]
#[command(
    name = "sshw",
    about = "ssh client wrapper for automatic login",
    disable_version_flag = true
)]
pub struct Cli {
    #[arg(short = 'v', long = "version", help = "show version")]
    pub version: bool,

    #[arg(
        short = 'c',
        value_name = "CMD",
        allow_hyphen_values = true,
        help = "remote command to run after login"
    )]
    pub command: Option<String>,

    #[arg(short = 's', help = "use local ssh config '~/.ssh/config'")]
    pub ssh_config: bool,

    #[arg(
        long = "put",
        value_name = "PATH",
        allow_hyphen_values = true,
        help = "send a local file to the remote host"
    )]
    pub put: Option<String>,

    #[arg(
        long = "get",
        value_name = "PATH",
        allow_hyphen_values = true,
        help = "fetch a remote file"
    )]
    pub get: Option<String>,

    #[arg(
        short = 'o',
        value_name = "PATH",
        default_value = "",
        hide_default_value = true,
        allow_hyphen_values = true,
        help = "destination for -put / -get (defaults to the source's base name)"
    )]
    pub output: String,

    #[arg(
        short = 'n',
        value_name = "NAME",
        allow_hyphen_values = true,
        help = "connect to the node with this exact name"
    )]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Upload { src: String, dest: String },
    Download { src: String, dest: String },
    Shell { command: Option<String> },
}

impl Cli {
    pub fn parse_args<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self::try_parse_from(normalize_args(args))
    }

    /// Upload wins over download; without either an interactive shell is opened.
    pub fn action(&self) -> Action {
        if let Some(src) = self.put.as_ref().filter(|p| !p.is_empty()) {
            return Action::Upload {
                src: src.clone(),
                dest: self.output.clone(),
            };
        }
        if let Some(src) = self.get.as_ref().filter(|p| !p.is_empty()) {
            return Action::Download {
                src: src.clone(),
                dest: self.output.clone(),
            };
        }
        Action::Shell {
            command: self.command.clone().filter(|c| !c.is_empty()),
        }
    }
}

/// Rewrites `-version`/`-put x` to their `--` forms and `--c`/`--n x` to
/// their `-` forms so both spellings parse. The token after a flag that
/// takes a value is passed through untouched.
pub fn normalize_args<I, T>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = T>,
    T: Into<String>,
{
    let mut out = Vec::new();
    let mut passthrough = false;
    let mut expect_value = false;
    for (idx, arg) in args.into_iter().map(Into::into).enumerate() {
        if idx == 0 || passthrough || expect_value {
            expect_value = false;
            out.push(arg);
            continue;
        }
        if arg == "--" {
            passthrough = true;
            out.push(arg);
            continue;
        }
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, _)) => (flag, true),
            None => (arg.as_str(), false),
        };
        let name = flag
            .strip_prefix("--")
            .or_else(|| flag.strip_prefix('-'))
            .unwrap_or("");
        expect_value = !inline && TAKES_VALUE.contains(&name);
        let double = flag.starts_with("--");
        if double && DOUBLE_DASH_SHORT.contains(&name) {
            out.push(arg[1..].to_string());
        } else if !double && SINGLE_DASH_LONG.contains(&name) {
            out.push(format!("-{}", arg));
        } else {
            out.push(arg);
        }
    }
    out
}

pub fn version_text() -> String {
    let lines = [
        "sshw - ssh client wrapper for automatic login".to_string(),
        format!("  build      : {}", option_env!("SSHW_BUILD").unwrap_or("devel")),
        format!("  version    : {}", env!("CARGO_PKG_VERSION")),
        format!("  rustc      : {}", option_env!("SSHW_RUSTC_VERSION").unwrap_or("unknown")),
        format!("  platform   : {}/{}", std::env::consts::OS, std::env::consts::ARCH),
    ];
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut full = vec!["sshw"];
        full.extend_from_slice(args);
        Cli::parse_args(full).unwrap()
    }

    #[test]
    fn single_dash_long_flags_are_accepted() {
        let cli = parse(&["-put", "a.txt", "-o", "/tmp", "-n", "web"]);
        assert_eq!(cli.put.as_deref(), Some("a.txt"));
        assert_eq!(cli.output, "/tmp");
        assert_eq!(cli.name.as_deref(), Some("web"));
        assert!(parse(&["-version"]).version);
    }

    #[test]
    fn double_dash_short_flags_are_accepted() {
        let cli = parse(&["--c", "uptime", "--s", "--get=/var/log/syslog"]);
        assert_eq!(cli.command.as_deref(), Some("uptime"));
        assert!(cli.ssh_config);
        assert_eq!(cli.get.as_deref(), Some("/var/log/syslog"));
    }

    #[test]
    fn help_is_reported_as_display_help() {
        let err = Cli::parse_args(["sshw", "-help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn put_takes_precedence_over_get() {
        let cli = parse(&["-put", "a", "-get", "b"]);
        assert_eq!(
            cli.action(),
            Action::Upload {
                src: "a".to_string(),
                dest: String::new()
            }
        );
    }

    #[test]
    fn shell_action_drops_empty_command() {
        assert_eq!(parse(&["-c", ""]).action(), Action::Shell { command: None });
        assert_eq!(
            parse(&["-c", "df -h"]).action(),
            Action::Shell {
                command: Some("df -h".to_string())
            }
        );
    }

    #[test]
    fn normalize_stops_at_double_dash() {
        let args = normalize_args(["sshw", "-s", "-version", "--", "-put"]);
        assert_eq!(args, vec!["sshw", "-s", "--version", "--", "-put"]);
    }

    #[test]
    fn values_that_look_like_flags_are_kept() {
        let args = normalize_args(["sshw", "-c", "-version", "--n", "--c", "-get", "-put"]);
        assert_eq!(args, vec!["sshw", "-c", "-version", "-n", "--c", "--get", "-put"]);

        let cli = parse(&["-c", "-version"]);
        assert_eq!(cli.command.as_deref(), Some("-version"));
        assert!(!cli.version);

        let cli = parse(&["-n", "-help", "-o", "--s"]);
        assert_eq!(cli.name.as_deref(), Some("-help"));
        assert_eq!(cli.output, "--s");
        assert!(!cli.ssh_config);
    }

    #[test]
    fn version_text_names_build_and_platform() {
        let text = version_text();
        assert!(text.starts_with("sshw"));
        assert!(text.contains(env!("CARGO_PKG_VERSION")));
        assert!(text.contains(std::env::consts::OS));
        assert!(text.lines().any(|line| line.trim_start().starts_with("rustc")));
    }
}
