//! Interactive selection over the host tree.
//!
//! Each prompt shows one level. Entering a group pushes a frame whose
//! parent is the level it was entered from; the `Back` entry at the head of
//! a group's list pops exactly one frame. Only one level of ancestry is
//! remembered: backing out of a level that was itself reached by `Back`
//! returns to the root.

use crate::config::Node;
use crate::constants::navigation::BACK_LABEL;
use crate::errors::ClientError;
use crate::services::logger::Logger;

#[derive(Debug, Clone, Copy)]
pub enum Entry<'a> {
    Back,
    Node(&'a Node),
}

impl<'a> Entry<'a> {
    pub fn label(&self) -> String {
        match self {
            Entry::Back => BACK_LABEL.to_string(),
            Entry::Node(node) => node.display_line(),
        }
    }

    pub fn matches(&self, query: &str) -> bool {
        match self {
            Entry::Back => matches_text(BACK_LABEL, query),
            Entry::Node(node) => matches_query(node, query),
        }
    }
}

/// Presents one level and returns the chosen index into `entries`, or `None`
/// when the user cancels.
pub trait SelectPrompt {
    fn choose(&mut self, label: &str, entries: &[Entry<'_>]) -> Option<usize>;
}

/// Search predicate over `"<name> <user> <host>"`. A query containing a space
/// is split into tokens that must all appear; otherwise the whole query must.
pub fn matches_query(node: &Node, query: &str) -> bool {
    let content = format!("{} {} {}", node.name, node.configured_user(), node.host);
    matches_text(&content, query)
}

fn matches_text(content: &str, query: &str) -> bool {
    if query.contains(' ') {
        return query
            .split(' ')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .all(|token| content.contains(token));
    }
    content.contains(query)
}

/// Depth-first, pre-order search for a node whose name equals `name`.
pub fn find_by_name<'a>(nodes: &'a [Node], name: &str) -> Option<&'a Node> {
    for node in nodes {
        if node.name == name {
            return Some(node);
        }
        if node.is_group() {
            if let Some(found) = find_by_name(&node.children, name) {
                return Some(found);
            }
        }
    }
    None
}

/// Resolves `-n <name>` to a connectable node. Groups have no host and are
/// rejected.
pub fn resolve_by_name(nodes: &[Node], name: &str) -> Result<Node, ClientError> {
    match find_by_name(nodes, name) {
        Some(node) if node.is_group() => {
            Err(ClientError::config(format!("node {} is a group", name)))
        }
        Some(node) => Ok(node.clone()),
        None => Err(ClientError::config(format!("no node named {}", name))),
    }
}

#[derive(Debug, Clone, Copy)]
struct Frame<'a> {
    level: &'a [Node],
    parent: Option<&'a [Node]>,
    has_back: bool,
}

impl<'a> Frame<'a> {
    fn root(root: &'a [Node]) -> Self {
        Self {
            level: root,
            parent: None,
            has_back: false,
        }
    }

    fn entries(&self) -> Vec<Entry<'a>> {
        let mut entries = Vec::with_capacity(self.level.len() + 1);
        if self.has_back {
            entries.push(Entry::Back);
        }
        entries.extend(self.level.iter().map(Entry::Node));
        entries
    }
}

pub struct Navigator<'a> {
    logger: Logger,
    root: &'a [Node],
    label: String,
}

impl<'a> Navigator<'a> {
    pub fn new(logger: Logger, root: &'a [Node], label: &str) -> Self {
        Self {
            logger: logger.child("navigator"),
            root,
            label: label.to_string(),
        }
    }

    /// Runs the selection loop until a leaf is chosen or the prompt is cancelled.
    pub fn select<P: SelectPrompt>(&self, prompt: &mut P) -> Option<&'a Node> {
        let mut frame = Frame::root(self.root);
        loop {
            let entries = frame.entries();
            let index = prompt.choose(&self.label, &entries)?;
            let Some(entry) = entries.get(index).copied() else {
                self.logger.warn(
                    "prompt returned an out-of-range index",
                    Some(&serde_json::json!({ "index": index, "len": entries.len() })),
                );
                return None;
            };
            frame = match entry {
                Entry::Back => match frame.parent {
                    None => Frame::root(self.root),
                    Some(parent) => Frame {
                        level: parent,
                        parent: None,
                        has_back: !std::ptr::eq(parent, self.root),
                    },
                },
                Entry::Node(node) if node.is_group() => {
                    self.logger.debug(
                        "entering group",
                        Some(&serde_json::json!({ "name": node.name })),
                    );
                    Frame {
                        level: &node.children,
                        parent: Some(frame.level),
                        has_back: true,
                    }
                }
                Entry::Node(node) => return Some(node),
            };
        }
    }
}
