use crate::constants::network::SSH_DEFAULT_PORT;
use crate::utils::user_paths::current_username;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackShell {
    #[serde(default)]
    pub cmd: String,
    /// Milliseconds to wait before typing `cmd`.
    #[serde(default)]
    pub delay: u64,
}

impl CallbackShell {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay)
    }
}

/// One entry of the host tree. Nodes with children are groups and are only
/// navigated; nodes without children are leaves and must name a host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Node {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default)]
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_bytes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "key-path")]
    pub keypath: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passphrase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub jump: Vec<Node>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub callback_shells: Vec<CallbackShell>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,
}

impl Node {
    pub fn leaf(name: &str, user: &str, host: &str) -> Self {
        Self {
            name: name.to_string(),
            host: host.to_string(),
            user: (!user.is_empty()).then(|| user.to_string()),
            ..Self::default()
        }
    }

    pub fn group(name: &str, children: Vec<Node>) -> Self {
        Self {
            name: name.to_string(),
            children,
            ..Self::default()
        }
    }

    pub fn is_group(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn port(&self) -> u16 {
        match self.port {
            Some(port) if port > 0 => port,
            _ => SSH_DEFAULT_PORT,
        }
    }

    pub fn user(&self) -> String {
        match self.user.as_deref() {
            Some(user) if !user.is_empty() => user.to_string(),
            _ => current_username(),
        }
    }

    /// User as written in the config, without the OS fallback. Used for display and search.
    pub fn configured_user(&self) -> &str {
        self.user.as_deref().unwrap_or("")
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref().filter(|p| !p.is_empty())
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port())
    }

    /// `name(alias) user@host`, the row text shown by the selector.
    pub fn display_line(&self) -> String {
        let mut line = self.name.clone();
        if let Some(alias) = self.alias.as_deref().filter(|a| !a.is_empty()) {
            line.push('(');
            line.push_str(alias);
            line.push(')');
        }
        if !self.host.is_empty() {
            line.push(' ');
            if let Some(user) = self.user.as_deref().filter(|u| !u.is_empty()) {
                line.push_str(user);
                line.push('@');
            }
            line.push_str(&self.host);
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_defaults_to_22() {
        let mut node = Node::leaf("n", "u", "h");
        assert_eq!(node.port(), 22);
        node.port = Some(0);
        assert_eq!(node.port(), 22);
        node.port = Some(2222);
        assert_eq!(node.port(), 2222);
        assert_eq!(node.address(), "h:2222");
    }

    #[test]
    fn user_falls_back_to_os_user() {
        let node = Node::leaf("n", "", "h");
        assert_eq!(node.user(), current_username());
        assert_eq!(node.configured_user(), "");
    }

    #[test]
    fn display_line_includes_alias_and_user() {
        let mut node = Node::leaf("web", "deploy", "10.0.0.2");
        node.alias = Some("prod".to_string());
        assert_eq!(node.display_line(), "web(prod) deploy@10.0.0.2");
        let group = Node::group("dc1", vec![node]);
        assert_eq!(group.display_line(), "dc1");
    }

    #[test]
    fn empty_password_is_absent() {
        let mut node = Node::leaf("n", "u", "h");
        node.password = Some(String::new());
        assert_eq!(node.password(), None);
    }
}
