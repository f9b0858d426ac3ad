//! Progress reporting for long transfers
//!
//! Transfers emit `start(total)`, a monotonic series of `progress(n)` with
//! `0 <= n <= total`, then `end()`. Rendering is up to the implementation.

/// Sink for transfer progress
pub trait Progress {
    fn start(&mut self, total: u64);
    fn progress(&mut self, n: u64);
    fn end(&mut self);
}

/// Progress sink that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn start(&mut self, _total: u64) {}
    fn progress(&mut self, _n: u64) {}
    fn end(&mut self) {}
}
