//! Searchable single-choice list drawn inline on the terminal with crossterm.

use crate::constants::navigation::PAGE_SIZE;
use crate::navigator::{Entry, SelectPrompt};
use crate::utils::terminal::RawModeGuard;
use crossterm::cursor::{Hide, MoveToColumn, MoveUp, Show};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::style::Stylize;
use crossterm::terminal::{Clear, ClearType};
use crossterm::{queue, QueueableCommand};
use std::io::{self, Write};

/// Filter and cursor state, kept apart from drawing so it can be tested.
#[derive(Debug, Default)]
pub struct SelectState {
    query: String,
    visible: Vec<usize>,
    cursor: usize,
    offset: usize,
    page_size: usize,
}

impl SelectState {
    pub fn new(entries: &[Entry<'_>], page_size: usize) -> Self {
        let mut state = Self {
            page_size: page_size.max(1),
            ..Self::default()
        };
        state.refilter(entries);
        state
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    fn refilter(&mut self, entries: &[Entry<'_>]) {
        self.visible = entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.matches(&self.query))
            .map(|(idx, _)| idx)
            .collect();
        self.cursor = 0;
        self.offset = 0;
    }

    pub fn push_char(&mut self, entries: &[Entry<'_>], ch: char) {
        self.query.push(ch);
        self.refilter(entries);
    }

    pub fn backspace(&mut self, entries: &[Entry<'_>]) {
        if self.query.pop().is_some() {
            self.refilter(entries);
        }
    }

    pub fn move_by(&mut self, delta: isize) {
        if self.visible.is_empty() {
            return;
        }
        let last = self.visible.len() as isize - 1;
        self.cursor = (self.cursor as isize + delta).clamp(0, last) as usize;
        if self.cursor < self.offset {
            self.offset = self.cursor;
        } else if self.cursor >= self.offset + self.page_size {
            self.offset = self.cursor + 1 - self.page_size;
        }
    }

    pub fn page(&self) -> isize {
        self.page_size as isize
    }

    /// Index into the full entry list of the highlighted row.
    pub fn selected(&self) -> Option<usize> {
        self.visible.get(self.cursor).copied()
    }

    fn window(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.visible
            .iter()
            .copied()
            .enumerate()
            .skip(self.offset)
            .take(self.page_size)
    }
}

fn styled_row(entry: &Entry<'_>, active: bool) -> String {
    let Entry::Node(node) = entry else {
        let label = entry.label();
        return if active {
            format!("➤ {}", label.cyan())
        } else {
            format!("  {}", label.dim())
        };
    };
    let mut row = String::new();
    if active {
        row.push_str(&format!("➤ {}", node.name.as_str().cyan()));
    } else {
        row.push_str(&format!("  {}", node.name.as_str().dim()));
    }
    if let Some(alias) = node.alias.as_deref().filter(|a| !a.is_empty()) {
        let alias = format!("({})", alias);
        if active {
            row.push_str(&format!("{}", alias.yellow()));
        } else {
            row.push_str(&format!("{}", alias.dim()));
        }
    }
    if !node.host.is_empty() {
        let target = match node.user.as_deref().filter(|u| !u.is_empty()) {
            Some(user) => format!("{}@{}", user, node.host),
            None => node.host.clone(),
        };
        row.push_str(&format!(" {}", target.dim()));
    }
    row
}

pub struct TerminalSelect {
    page_size: usize,
}

impl Default for TerminalSelect {
    fn default() -> Self {
        Self {
            page_size: PAGE_SIZE,
        }
    }
}

impl TerminalSelect {
    fn draw(
        &self,
        out: &mut impl Write,
        label: &str,
        entries: &[Entry<'_>],
        state: &SelectState,
        drawn: &mut u16,
    ) -> io::Result<()> {
        if *drawn > 0 {
            out.queue(MoveUp(*drawn))?;
        }
        queue!(out, MoveToColumn(0), Clear(ClearType::FromCursorDown))?;
        let mut lines = 0u16;
        write!(
            out,
            "{} {}\r\n",
            format!("✨ {}", label).green(),
            state.query()
        )?;
        lines += 1;
        if state.visible.is_empty() {
            write!(out, "  {}\r\n", "no results".dim())?;
            lines += 1;
        }
        for (pos, idx) in state.window() {
            write!(out, "{}\r\n", styled_row(&entries[idx], pos == state.cursor))?;
            lines += 1;
        }
        out.flush()?;
        *drawn = lines;
        Ok(())
    }

    fn clear(&self, out: &mut impl Write, drawn: u16) -> io::Result<()> {
        if drawn > 0 {
            out.queue(MoveUp(drawn))?;
        }
        queue!(out, MoveToColumn(0), Clear(ClearType::FromCursorDown), Show)?;
        out.flush()
    }

    fn run(&mut self, label: &str, entries: &[Entry<'_>]) -> io::Result<Option<usize>> {
        let _raw = RawModeGuard::enter()?;
        let mut out = io::stdout();
        out.queue(Hide)?;
        let mut state = SelectState::new(entries, self.page_size);
        let mut drawn = 0u16;
        let outcome = loop {
            self.draw(&mut out, label, entries, &state, &mut drawn)?;
            let Event::Key(KeyEvent {
                code,
                modifiers,
                kind,
                ..
            }) = event::read()?
            else {
                continue;
            };
            if kind == KeyEventKind::Release {
                continue;
            }
            match code {
                KeyCode::Char('c') | KeyCode::Char('d')
                    if modifiers.contains(KeyModifiers::CONTROL) =>
                {
                    break None;
                }
                KeyCode::Esc => break None,
                KeyCode::Enter => {
                    if let Some(idx) = state.selected() {
                        break Some(idx);
                    }
                }
                KeyCode::Up => state.move_by(-1),
                KeyCode::Down => state.move_by(1),
                KeyCode::Char('k') if modifiers.contains(KeyModifiers::CONTROL) => {
                    state.move_by(-1)
                }
                KeyCode::Char('j') if modifiers.contains(KeyModifiers::CONTROL) => {
                    state.move_by(1)
                }
                KeyCode::PageUp => state.move_by(-state.page()),
                KeyCode::PageDown => state.move_by(state.page()),
                KeyCode::Backspace => state.backspace(entries),
                KeyCode::Char(ch) => state.push_char(entries, ch),
                _ => {}
            }
        };
        self.clear(&mut out, drawn)?;
        Ok(outcome)
    }
}

impl SelectPrompt for TerminalSelect {
    fn choose(&mut self, label: &str, entries: &[Entry<'_>]) -> Option<usize> {
        match self.run(label, entries) {
            Ok(choice) => choice,
            Err(err) => {
                let _ = io::stdout().queue(Show).and_then(|out| out.flush());
                eprintln!("select failed: {}", err);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Node;

    #[test]
    fn typing_filters_and_cursor_tracks_visible_rows() {
        let nodes = vec![
            Node::leaf("web", "deploy", "10.0.0.1"),
            Node::leaf("db", "postgres", "10.0.0.2"),
            Node::leaf("cache", "redis", "10.0.0.3"),
        ];
        let entries: Vec<Entry<'_>> = nodes.iter().map(Entry::Node).collect();
        let mut state = SelectState::new(&entries, 20);
        assert_eq!(state.selected(), Some(0));

        for ch in "10.0.0 red".chars() {
            state.push_char(&entries, ch);
        }
        assert_eq!(state.selected(), Some(2));

        state.backspace(&entries);
        state.backspace(&entries);
        state.backspace(&entries);
        state.move_by(1);
        assert_eq!(state.selected(), Some(1));
        state.move_by(10);
        assert_eq!(state.selected(), Some(2));
    }

    #[test]
    fn window_scrolls_with_cursor() {
        let nodes: Vec<Node> = (0..5)
            .map(|i| Node::leaf(&format!("n{}", i), "", "h"))
            .collect();
        let entries: Vec<Entry<'_>> = nodes.iter().map(Entry::Node).collect();
        let mut state = SelectState::new(&entries, 2);
        state.move_by(3);
        let shown: Vec<usize> = state.window().map(|(_, idx)| idx).collect();
        assert_eq!(shown, vec![2, 3]);
        state.move_by(-3);
        let shown: Vec<usize> = state.window().map(|(_, idx)| idx).collect();
        assert_eq!(shown, vec![0, 1]);
    }

    #[test]
    fn no_match_selects_nothing() {
        let nodes = vec![Node::leaf("web", "deploy", "10.0.0.1")];
        let entries: Vec<Entry<'_>> = nodes.iter().map(Entry::Node).collect();
        let mut state = SelectState::new(&entries, 20);
        state.push_char(&entries, 'z');
        assert_eq!(state.selected(), None);
        state.move_by(1);
        assert_eq!(state.selected(), None);
    }
}
