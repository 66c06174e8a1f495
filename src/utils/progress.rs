use std::io::{self, Read};
use std::time::{Duration, Instant};

/// Wraps a reader and reports `(copied, total)` at most once per `interval`,
/// plus once more when the underlying reader hits EOF.
pub struct ProgressReader<R, F>
where
    F: FnMut(u64, u64),
{
    inner: R,
    total: u64,
    copied: u64,
    interval: Duration,
    last_report: Instant,
    finished: bool,
    on_progress: F,
}

impl<R, F> ProgressReader<R, F>
where
    R: Read,
    F: FnMut(u64, u64),
{
    pub fn new(inner: R, total: u64, interval: Duration, on_progress: F) -> Self {
        Self {
            inner,
            total,
            copied: 0,
            interval,
            last_report: Instant::now(),
            finished: false,
            on_progress,
        }
    }

    pub fn copied(&self) -> u64 {
        self.copied
    }
}

impl<R, F> Read for ProgressReader<R, F>
where
    R: Read,
    F: FnMut(u64, u64),
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n == 0 {
            if !self.finished {
                self.finished = true;
                (self.on_progress)(self.copied, self.total);
            }
            return Ok(0);
        }
        self.copied += n as u64;
        if self.last_report.elapsed() >= self.interval {
            self.last_report = Instant::now();
            (self.on_progress)(self.copied, self.total);
        }
        Ok(n)
    }
}
