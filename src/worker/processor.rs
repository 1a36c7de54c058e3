use crate::core::error::Result;
use crate::core::types::Stat;
use crate::dispatch::batch::Batch;
use crate::worker::rate_limiter::RateLimiter;

/// Executes batches against the target system. One instance per worker,
/// created and used on that worker's thread.
pub trait Processor<B: Batch> {
    /// Per-worker setup (connections, pools). An error aborts the run.
    fn init(&mut self, worker: usize, load_enabled: bool, total_workers: usize) -> Result<()>;

    /// Runs every item of `batch` and reports what each command measured.
    ///
    /// Per-command failures belong in the returned [`Stat`] as error or timeout
    /// flags. Returning `Err` is fatal for the whole run.
    fn process_batch(
        &mut self,
        batch: &mut B,
        load_enabled: bool,
        limiter: &RateLimiter,
        use_limiter: bool,
    ) -> Result<Stat>;

    /// Cleanup after the worker's queue closed.
    fn close(&mut self, _load_enabled: bool) {}
}
