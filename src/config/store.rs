use super::node::Node;
use super::ssh_config::parse_ssh_config;
use crate::constants::config::{CONFIG_FILE_NAMES, ENV_CONFIG_PATH, SSH_CONFIG_PATH};
use crate::errors::ClientError;
use crate::services::logger::Logger;
use crate::utils::user_paths::expand_home_path;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no config file found, tried: {0}")]
    NotFound(String),
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("node '{0}' has no children and no host")]
    MissingHost(String),
}

impl From<ConfigError> for ClientError {
    fn from(err: ConfigError) -> Self {
        let hint = match &err {
            ConfigError::NotFound(_) => Some("create ~/.sshw or pass -s to use ~/.ssh/config"),
            ConfigError::MissingHost(_) => Some("every leaf node needs a host"),
            _ => None,
        };
        let converted = ClientError::config(err.to_string());
        match hint {
            Some(hint) => converted.with_hint(hint),
            None => converted,
        }
    }
}

/// Owns the loaded host forest.
pub struct ConfigStore {
    logger: Logger,
    nodes: Vec<Node>,
}

impl ConfigStore {
    pub fn new(logger: Logger) -> Self {
        Self {
            logger: logger.child("config"),
            nodes: Vec::new(),
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn into_nodes(self) -> Vec<Node> {
        self.nodes
    }

    fn candidate_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(explicit) = std::env::var_os(ENV_CONFIG_PATH) {
            if !explicit.is_empty() {
                paths.push(expand_home_path(PathBuf::from(explicit)));
            }
        }
        for name in CONFIG_FILE_NAMES {
            paths.push(expand_home_path(format!("~/{}", name)));
        }
        for name in CONFIG_FILE_NAMES {
            paths.push(PathBuf::from(name));
        }
        paths
    }

    /// Loads the first readable host file from the usual locations.
    pub fn load_config(&mut self) -> Result<(), ConfigError> {
        let candidates = Self::candidate_paths();
        for path in &candidates {
            if !path.is_file() {
                continue;
            }
            return self.load_config_from(path);
        }
        let tried = candidates
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        Err(ConfigError::NotFound(tried))
    }

    pub fn load_config_from(&mut self, path: &Path) -> Result<(), ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let nodes = parse_nodes(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        validate_nodes(&nodes)?;
        self.logger.debug(
            "loaded host config",
            Some(&serde_json::json!({
                "path": path.display().to_string(),
                "top_level": nodes.len(),
            })),
        );
        self.nodes = nodes;
        Ok(())
    }

    /// Reads `~/.ssh/config`; every concrete `Host` alias becomes a leaf.
    pub fn load_ssh_config(&mut self) -> Result<(), ConfigError> {
        self.load_ssh_config_from(&expand_home_path(SSH_CONFIG_PATH))
    }

    pub fn load_ssh_config_from(&mut self, path: &Path) -> Result<(), ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let nodes = parse_ssh_config(&content);
        self.logger.debug(
            "loaded ssh config",
            Some(&serde_json::json!({
                "path": path.display().to_string(),
                "hosts": nodes.len(),
            })),
        );
        self.nodes = nodes;
        Ok(())
    }
}

pub fn parse_nodes(content: &str) -> Result<Vec<Node>, serde_yaml::Error> {
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    let nodes: Option<Vec<Node>> = serde_yaml::from_str(content)?;
    Ok(nodes.unwrap_or_default())
}

fn validate_nodes(nodes: &[Node]) -> Result<(), ConfigError> {
    for node in nodes {
        if node.is_group() {
            validate_nodes(&node.children)?;
            continue;
        }
        if node.host.trim().is_empty() {
            return Err(ConfigError::MissingHost(node.name.clone()));
        }
        validate_nodes(&node.jump)?;
    }
    Ok(())
}
