//! Just enough of the OpenSSH client config format to turn `Host` blocks
//! into leaves: `HostName`, `Port`, `User` and `IdentityFile`.

use super::node::Node;

#[derive(Debug, Default, Clone)]
struct HostBlock {
    aliases: Vec<String>,
    host_name: Option<String>,
    port: Option<u16>,
    user: Option<String>,
    identity_file: Option<String>,
}

impl HostBlock {
    fn into_nodes(self, out: &mut Vec<Node>) {
        for alias in &self.aliases {
            if is_pattern(alias) {
                continue;
            }
            out.push(Node {
                name: alias.clone(),
                host: self.host_name.clone().unwrap_or_else(|| alias.clone()),
                port: self.port,
                user: self.user.clone(),
                keypath: self.identity_file.clone(),
                ..Node::default()
            });
        }
    }
}

fn is_pattern(alias: &str) -> bool {
    alias.contains(['*', '?', '!'])
}

fn split_directive(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let split_at = line.find(|c: char| c.is_whitespace() || c == '=')?;
    let key = line[..split_at].to_lowercase();
    let value = line[split_at..]
        .trim_start_matches(|c: char| c.is_whitespace() || c == '=')
        .trim()
        .trim_matches('"')
        .to_string();
    if value.is_empty() {
        return None;
    }
    Some((key, value))
}

pub fn parse_ssh_config(content: &str) -> Vec<Node> {
    let mut nodes = Vec::new();
    let mut current: Option<HostBlock> = None;
    for line in content.lines() {
        let Some((key, value)) = split_directive(line) else {
            continue;
        };
        match key.as_str() {
            "host" => {
                if let Some(block) = current.take() {
                    block.into_nodes(&mut nodes);
                }
                current = Some(HostBlock {
                    aliases: value.split_whitespace().map(str::to_string).collect(),
                    ..HostBlock::default()
                });
            }
            // Match blocks are conditional; stop attributing directives to the previous Host.
            "match" => {
                if let Some(block) = current.take() {
                    block.into_nodes(&mut nodes);
                }
            }
            _ => {
                let Some(block) = current.as_mut() else {
                    continue;
                };
                // First value wins, as in ssh(1).
                match key.as_str() {
                    "hostname" if block.host_name.is_none() => block.host_name = Some(value),
                    "port" if block.port.is_none() => block.port = value.parse().ok(),
                    "user" if block.user.is_none() => block.user = Some(value),
                    "identityfile" if block.identity_file.is_none() => {
                        block.identity_file = Some(value)
                    }
                    _ => {}
                }
            }
        }
    }
    if let Some(block) = current.take() {
        block.into_nodes(&mut nodes);
    }
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_blocks_become_leaves() {
        let nodes = parse_ssh_config(
            "# comment\n\
             Host web web-alt\n\
             \tHostName 10.0.0.5\n\
             \tPort 2222\n\
             \tUser deploy\n\
             \tIdentityFile ~/.ssh/web\n\
             \n\
             Host db\n\
             \tUser=postgres\n",
        );
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[0].name, "web");
        assert_eq!(nodes[0].host, "10.0.0.5");
        assert_eq!(nodes[0].port(), 2222);
        assert_eq!(nodes[0].configured_user(), "deploy");
        assert_eq!(nodes[0].keypath.as_deref(), Some("~/.ssh/web"));
        assert_eq!(nodes[1].name, "web-alt");
        assert_eq!(nodes[2].host, "db");
        assert_eq!(nodes[2].configured_user(), "postgres");
    }

    #[test]
    fn wildcard_hosts_are_skipped() {
        let nodes = parse_ssh_config("Host *\n  User root\nHost *.internal box\n  Port 22\n");
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].name, "box");
        assert_eq!(nodes[0].configured_user(), "");
    }

    #[test]
    fn first_value_wins_and_match_blocks_are_ignored() {
        let nodes = parse_ssh_config(
            "Host a\n  HostName one\n  HostName two\nMatch user x\n  HostName three\n",
        );
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].host, "one");
    }
}
