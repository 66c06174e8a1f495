use crossterm::terminal::{disable_raw_mode, enable_raw_mode, is_raw_mode_enabled};
use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TermSize {
    pub cols: u16,
    pub rows: u16,
}

impl TermSize {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }
}

/// The local side of an interactive session.
pub trait LocalTerminal: Send + Sync + 'static {
    fn size(&self) -> io::Result<TermSize>;
    fn enter_raw_mode(&self) -> io::Result<RawModeGuard>;
}

type Restore = Box<dyn FnOnce() -> io::Result<()> + Send>;

/// Puts the previous terminal mode back when dropped.
pub struct RawModeGuard {
    restore: Option<Restore>,
}

impl RawModeGuard {
    pub fn enter() -> io::Result<Self> {
        if is_raw_mode_enabled().unwrap_or(false) {
            return Ok(Self::noop());
        }
        enable_raw_mode()?;
        Ok(Self::with_restore(disable_raw_mode))
    }

    pub fn with_restore(restore: impl FnOnce() -> io::Result<()> + Send + 'static) -> Self {
        Self {
            restore: Some(Box::new(restore)),
        }
    }

    pub fn noop() -> Self {
        Self { restore: None }
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Some(restore) = self.restore.take() {
            if restore().is_err() {
                eprint!("\r\nWarning: failed to restore terminal mode\r\n");
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Crossterm;

impl LocalTerminal for Crossterm {
    fn size(&self) -> io::Result<TermSize> {
        let (cols, rows) = crossterm::terminal::size()?;
        Ok(TermSize::new(cols, rows))
    }

    fn enter_raw_mode(&self) -> io::Result<RawModeGuard> {
        RawModeGuard::enter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn guard_runs_restore_once_on_drop() {
        let restored = Arc::new(AtomicBool::new(false));
        let flag = restored.clone();
        let guard = RawModeGuard::with_restore(move || {
            assert!(!flag.swap(true, Ordering::SeqCst));
            Ok(())
        });
        assert!(!restored.load(Ordering::SeqCst));
        drop(guard);
        assert!(restored.load(Ordering::SeqCst));
    }
}
