//! Job coordination.
//!
//! The [`Coordinator`] drives one job through its lifecycle:
//!
//! ```text
//! Loading ─▶ Planning ─▶ Running ─▶ Joining ─▶ Writing ─▶ Done
//!    │          │           │          │          │
//!    └──────────┴───────────┴──────────┴──────────┴──▶ Failed
//! ```
//!
//! Workers run inside a [`std::thread::scope`], so the payload and key they
//! borrow cannot be released until every spawned worker has been joined, even
//! when spawning fails partway. Buffers are released in reverse acquisition
//! order on every exit path.

use crate::error::{Result, StatusCode, TransformError};
use crate::loader::{DataBuffer, KeyBuffer};
use crate::planner::{Fragment, FragmentRange, plan_fragments, reserve_exact, split_fragments};
use crate::worker::{
    CompletionSignal, CompletionWaiter, WorkerReport, completion_signal, run_fragment,
};
use crate::writer::write_output;
use crate::WORKER_THREAD_PREFIX;
use std::fmt;
use std::io;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::thread::{self, Scope, ScopedJoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// A transform request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// File to transform
    pub input_path: PathBuf,
    /// Destination, created or truncated
    pub output_path: PathBuf,
    /// Repeating key
    pub key_path: PathBuf,
    /// Number of workers (at least 1)
    pub thread_count: usize,
}

impl Job {
    /// Create a job description
    pub fn new(
        input_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
        key_path: impl Into<PathBuf>,
        thread_count: usize,
    ) -> Self {
        Self {
            input_path: input_path.into(),
            output_path: output_path.into(),
            key_path: key_path.into(),
            thread_count,
        }
    }

    /// Check preconditions that need no I/O
    ///
    /// # Errors
    ///
    /// Returns `InvalidThreadCount` if `thread_count` is 0.
    pub fn validate(&self) -> Result<()> {
        if self.thread_count == 0 {
            return Err(TransformError::InvalidThreadCount(self.thread_count));
        }
        Ok(())
    }
}

/// Coordinator lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Reading key and input
    Loading,
    /// Computing fragments
    Planning,
    /// Spawning workers
    Running,
    /// Waiting for every worker to signal completion
    Joining,
    /// Persisting the transformed buffer
    Writing,
    /// Finished successfully
    Done,
    /// Finished with an error
    Failed,
}

impl JobState {
    /// Whether no further transitions can happen
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loading => write!(f, "Loading"),
            Self::Planning => write!(f, "Planning"),
            Self::Running => write!(f, "Running"),
            Self::Joining => write!(f, "Joining"),
            Self::Writing => write!(f, "Writing"),
            Self::Done => write!(f, "Done"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Tunables for a job
#[derive(Debug, Clone)]
pub struct JobOptions {
    /// fsync the output before reporting success
    pub sync_output: bool,
    /// Reject key or input files larger than this many bytes
    pub max_buffer_size: Option<u64>,
    /// Worker thread name prefix; threads are named `{prefix}-{index}`
    pub thread_name_prefix: String,
    /// Worker stack size (OS default when `None`)
    pub stack_size: Option<usize>,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            sync_output: false,
            max_buffer_size: None,
            thread_name_prefix: WORKER_THREAD_PREFIX.to_string(),
            stack_size: None,
        }
    }
}

/// Wall-clock time per stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageTimings {
    /// Key and input loading
    pub load: Duration,
    /// Spawn, transform and join
    pub transform: Duration,
    /// Output write-back
    pub write: Duration,
    /// Whole job
    pub total: Duration,
}

/// Summary of a successful job
#[derive(Debug, Clone)]
pub struct JobReport {
    /// Bytes transformed and written
    pub bytes: u64,
    /// Key length in bytes
    pub key_length: usize,
    /// Fragment plan used
    pub plan: Vec<FragmentRange>,
    /// Per-worker reports, ordered by fragment index
    pub workers: Vec<WorkerReport>,
    /// Stage timings
    pub timings: StageTimings,
}

impl JobReport {
    /// Number of workers that ran
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.plan.len()
    }

    /// Bytes per second over the whole job
    #[must_use]
    pub fn throughput(&self) -> f64 {
        let secs = self.timings.total.as_secs_f64();
        if secs > 0.0 {
            self.bytes as f64 / secs
        } else {
            0.0
        }
    }
}

/// Runs transform jobs
#[derive(Debug)]
pub struct Coordinator {
    options: JobOptions,
    state: JobState,
    history: Vec<JobState>,
    #[cfg(test)]
    fail_spawn_at: Option<usize>,
    #[cfg(test)]
    panic_at: Option<usize>,
}

impl Coordinator {
    /// Create a coordinator with the given options
    #[must_use]
    pub fn new(options: JobOptions) -> Self {
        Self {
            options,
            state: JobState::Loading,
            history: Vec::new(),
            #[cfg(test)]
            fail_spawn_at: None,
            #[cfg(test)]
            panic_at: None,
        }
    }

    /// Options in effect
    #[must_use]
    pub fn options(&self) -> &JobOptions {
        &self.options
    }

    /// Current (or, after `run` returns, final) state
    #[must_use]
    pub fn state(&self) -> JobState {
        self.state
    }

    /// States visited by the most recent run, in order
    #[must_use]
    pub fn history(&self) -> &[JobState] {
        &self.history
    }

    /// Run a job to completion
    ///
    /// Blocks the calling thread until every worker has finished and the
    /// output has been written (or the job has failed).
    ///
    /// # Errors
    ///
    /// Returns the first error hit; see [`TransformError`] for the taxonomy.
    /// Workers already running when an error occurs are always joined first.
    pub fn run(&mut self, job: &Job) -> Result<JobReport> {
        let started = Instant::now();
        self.history.clear();
        self.enter(JobState::Loading);

        info!(
            "Transform job started: input={:?}, output={:?}, key={:?}, threads={}",
            job.input_path, job.output_path, job.key_path, job.thread_count
        );

        let result = self.execute(job, started);

        match &result {
            Ok(report) => {
                self.enter(JobState::Done);
                info!(
                    "Transform job done: {} bytes, {} workers, {:?}",
                    report.bytes,
                    report.thread_count(),
                    report.timings.total
                );
            }
            Err(err) => {
                let failed_in = self.state;
                self.enter(JobState::Failed);
                error!(
                    "Transform job failed during {} (status {}): {}",
                    failed_in,
                    err.status_code(),
                    err
                );
            }
        }

        result
    }

    fn execute(&mut self, job: &Job, started: Instant) -> Result<JobReport> {
        job.validate()?;

        let limit = self.options.max_buffer_size;
        let key = Held::new("key buffer", KeyBuffer::load(&job.key_path, limit)?);
        let mut data = Held::new("data buffer", DataBuffer::load(&job.input_path, limit)?);
        let load = started.elapsed();

        self.enter(JobState::Planning);
        let plan = plan_fragments(data.len(), job.thread_count)?;
        debug!(
            "Planned {} fragments over {} bytes (key {} bytes)",
            plan.len(),
            data.len(),
            key.len()
        );
        let fragments = split_fragments(data.as_mut_slice(), key.as_bytes(), &plan)?;

        let transform_started = Instant::now();
        let mut workers = self.fork_join(fragments)?;
        workers.sort_by_key(|report| report.index);
        let transform = transform_started.elapsed();

        self.enter(JobState::Writing);
        let write_started = Instant::now();
        let bytes = write_output(&job.output_path, data.as_slice(), self.options.sync_output)?;
        let write = write_started.elapsed();

        Ok(JobReport {
            bytes,
            key_length: key.len(),
            plan,
            workers,
            timings: StageTimings {
                load,
                transform,
                write,
                total: started.elapsed(),
            },
        })
    }

    /// Spawn one worker per fragment and wait for all of them
    fn fork_join(&mut self, fragments: Vec<Fragment<'_>>) -> Result<Vec<WorkerReport>> {
        self.enter(JobState::Running);
        let total = fragments.len();

        thread::scope(|scope| {
            let mut spawned: Vec<(CompletionWaiter, ScopedJoinHandle<'_, ()>)> = Vec::new();
            reserve_exact(&mut spawned, total)?;
            let mut reports = Vec::new();
            reserve_exact(&mut reports, total)?;
            let mut spawn_error = None;

            for fragment in fragments {
                let index = fragment.index();
                let (signal, waiter) = completion_signal(index);
                match self.spawn_worker(scope, fragment, signal) {
                    Ok(handle) => spawned.push((waiter, handle)),
                    Err(source) => {
                        error!("Failed to spawn worker {}: {}", index, source);
                        spawn_error = Some(TransformError::SpawnFailure { index, source });
                        break;
                    }
                }
            }

            if spawn_error.is_some() {
                warn!(
                    "Draining {} of {} workers after spawn failure",
                    spawned.len(),
                    total
                );
            } else {
                self.enter(JobState::Joining);
            }

            let mut worker_error = None;

            for (waiter, _) in &spawned {
                match waiter.wait() {
                    Some(report) => reports.push(report),
                    None => {
                        error!("Worker {} exited without signaling completion", waiter.index());
                        worker_error.get_or_insert(TransformError::WorkerPanicked {
                            index: waiter.index(),
                        });
                    }
                }
            }

            for (waiter, handle) in spawned {
                if handle.join().is_err() {
                    warn!("Worker {} panicked", waiter.index());
                    worker_error.get_or_insert(TransformError::WorkerPanicked {
                        index: waiter.index(),
                    });
                }
            }

            debug!("Joined {} workers", reports.len());

            match spawn_error.or(worker_error) {
                Some(err) => Err(err),
                None => Ok(reports),
            }
        })
    }

    fn spawn_worker<'scope, 'a: 'scope>(
        &self,
        scope: &'scope Scope<'scope, '_>,
        fragment: Fragment<'a>,
        signal: CompletionSignal,
    ) -> io::Result<ScopedJoinHandle<'scope, ()>> {
        let index = fragment.index();

        #[cfg(test)]
        if self.fail_spawn_at == Some(index) {
            return Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                "injected spawn failure",
            ));
        }

        let mut builder =
            thread::Builder::new().name(format!("{}-{}", self.options.thread_name_prefix, index));
        if let Some(size) = self.options.stack_size {
            builder = builder.stack_size(size);
        }

        #[cfg(test)]
        let panic_here = self.panic_at == Some(index);

        builder.spawn_scoped(scope, move || {
            #[cfg(test)]
            if panic_here {
                panic!("injected worker panic");
            }
            let report = run_fragment(fragment);
            signal.complete(report);
        })
    }

    fn enter(&mut self, next: JobState) {
        debug!("Job state: {} -> {}", self.state, next);
        self.state = next;
        self.history.push(next);
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new(JobOptions::default())
    }
}

/// Owned job resource that logs its release
struct Held<T> {
    name: &'static str,
    inner: T,
}

impl<T> Held<T> {
    fn new(name: &'static str, inner: T) -> Self {
        debug!("Acquired {}", name);
        Self { name, inner }
    }
}

impl<T> Deref for Held<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T> DerefMut for Held<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

impl<T> Drop for Held<T> {
    fn drop(&mut self) {
        debug!("Released {}", self.name);
    }
}

/// Transform `input_path` into `output_path` with the key at `key_path`
///
/// Runs a job with default options and reduces the outcome to a status:
/// `0` on success, a negative errno-style code otherwise.
///
/// Because the transform is self-inverse, the same call both encrypts and
/// decrypts.
pub fn transform_file(
    input_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    key_path: impl AsRef<Path>,
    thread_count: usize,
) -> StatusCode {
    let job = Job::new(
        input_path.as_ref(),
        output_path.as_ref(),
        key_path.as_ref(),
        thread_count,
    );
    let mut coordinator = Coordinator::default();
    StatusCode::from(&coordinator.run(&job))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::transform_in_place;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
    }

    impl Fixture {
        fn new(input: &[u8], key: &[u8]) -> Self {
            let dir = TempDir::new().unwrap();
            std::fs::write(dir.path().join("input.bin"), input).unwrap();
            std::fs::write(dir.path().join("key.bin"), key).unwrap();
            Self { dir }
        }

        fn path(&self, name: &str) -> PathBuf {
            self.dir.path().join(name)
        }

        fn job(&self, threads: usize) -> Job {
            Job::new(
                self.path("input.bin"),
                self.path("output.bin"),
                self.path("key.bin"),
                threads,
            )
        }

        fn output(&self) -> Vec<u8> {
            std::fs::read(self.path("output.bin")).unwrap()
        }
    }

    #[test]
    fn test_job_validate() {
        assert!(Job::new("a", "b", "c", 1).validate().is_ok());
        assert!(matches!(
            Job::new("a", "b", "c", 0).validate(),
            Err(TransformError::InvalidThreadCount(0))
        ));
    }

    #[test]
    fn test_single_byte_key_scenario() {
        let input: Vec<u8> = (0x01..=0x0A).collect();
        let fx = Fixture::new(&input, &[0xFF]);

        let mut coordinator = Coordinator::default();
        let report = coordinator.run(&fx.job(4)).unwrap();

        assert_eq!(
            fx.output(),
            vec![0xFE, 0xFD, 0xFC, 0xFB, 0xFA, 0xF9, 0xF8, 0xF7, 0xF6, 0xF5]
        );
        assert_eq!(report.bytes, 10);
        assert_eq!(report.key_length, 1);
        assert_eq!(report.thread_count(), 4);
        assert_eq!(report.workers.len(), 4);
    }

    #[test]
    fn test_state_history_on_success() {
        let fx = Fixture::new(b"hello world", b"k");
        let mut coordinator = Coordinator::default();
        coordinator.run(&fx.job(2)).unwrap();

        assert_eq!(coordinator.state(), JobState::Done);
        assert_eq!(
            coordinator.history(),
            &[
                JobState::Loading,
                JobState::Planning,
                JobState::Running,
                JobState::Joining,
                JobState::Writing,
                JobState::Done,
            ]
        );
    }

    #[test]
    fn test_remainder_fragment_and_determinism() {
        let input = b"abcdefg";
        let fx = Fixture::new(input, b"xyz");

        let mut coordinator = Coordinator::default();
        let report = coordinator.run(&fx.job(3)).unwrap();
        let sizes: Vec<usize> = report.workers.iter().map(WorkerReport::bytes).collect();
        assert_eq!(sizes, vec![2, 2, 3]);
        let first = fx.output();

        coordinator.run(&fx.job(3)).unwrap();
        assert_eq!(fx.output(), first);

        let mut expected = input.to_vec();
        transform_in_place(&mut expected, b"xyz");
        assert_eq!(first, expected);
    }

    #[test]
    fn test_more_threads_than_bytes() {
        let fx = Fixture::new(&[1, 2, 3], &[0x10]);
        let mut coordinator = Coordinator::default();
        let report = coordinator.run(&fx.job(16)).unwrap();

        assert_eq!(report.workers.len(), 16);
        assert_eq!(fx.output(), vec![0x11, 0x12, 0x13]);
    }

    #[test]
    fn test_empty_key_fails_before_spawn() {
        let fx = Fixture::new(b"data", b"");
        let mut coordinator = Coordinator::default();
        let err = coordinator.run(&fx.job(2)).unwrap_err();

        assert!(matches!(err, TransformError::EmptyOrInvalid { what: "key", .. }));
        assert_eq!(coordinator.history(), &[JobState::Loading, JobState::Failed]);
        assert!(!fx.path("output.bin").exists());
    }

    #[test]
    fn test_empty_input_fails_before_spawn() {
        let fx = Fixture::new(b"", b"key");
        let status = transform_file(
            fx.path("input.bin"),
            fx.path("output.bin"),
            fx.path("key.bin"),
            2,
        );

        assert_eq!(status.code(), -22);
        assert!(!fx.path("output.bin").exists());
    }

    #[test]
    fn test_zero_threads_rejected() {
        let fx = Fixture::new(b"data", b"key");
        let mut coordinator = Coordinator::default();
        let err = coordinator.run(&fx.job(0)).unwrap_err();
        assert!(matches!(err, TransformError::InvalidThreadCount(0)));
        assert!(!fx.path("output.bin").exists());
    }

    #[test]
    fn test_spawn_failure_drains_started_workers() {
        let fx = Fixture::new(&[0u8; 64], &[0x01]);
        let mut coordinator = Coordinator::default();
        coordinator.fail_spawn_at = Some(2);

        let err = coordinator.run(&fx.job(4)).unwrap_err();
        assert!(matches!(err, TransformError::SpawnFailure { index: 2, .. }));
        assert_eq!(err.status_code(), -11);
        assert_eq!(
            coordinator.history(),
            &[
                JobState::Loading,
                JobState::Planning,
                JobState::Running,
                JobState::Failed,
            ]
        );
        assert!(!fx.path("output.bin").exists());
    }

    #[test]
    fn test_worker_panic_fails_job() {
        let fx = Fixture::new(&[0u8; 64], &[0x01]);
        let mut coordinator = Coordinator::default();
        coordinator.panic_at = Some(1);

        let err = coordinator.run(&fx.job(4)).unwrap_err();
        assert!(matches!(err, TransformError::WorkerPanicked { index: 1 }));
        assert_eq!(err.status_code(), -5);
        assert_eq!(
            coordinator.history(),
            &[
                JobState::Loading,
                JobState::Planning,
                JobState::Running,
                JobState::Joining,
                JobState::Failed,
            ]
        );
        assert!(!fx.path("output.bin").exists());
    }

    #[test]
    fn test_unwritable_output_leaves_inputs_intact() {
        let input: Vec<u8> = (0..100).collect();
        let fx = Fixture::new(&input, b"key");
        // A directory cannot be opened as the output file
        std::fs::create_dir(fx.path("output.bin")).unwrap();

        let mut coordinator = Coordinator::default();
        let err = coordinator.run(&fx.job(3)).unwrap_err();
        assert!(err.status_code() < 0);
        assert_eq!(coordinator.state(), JobState::Failed);
        assert_eq!(coordinator.history()[coordinator.history().len() - 2], JobState::Writing);

        assert_eq!(std::fs::read(fx.path("input.bin")).unwrap(), input);
        assert_eq!(std::fs::read(fx.path("key.bin")).unwrap(), b"key");
    }

    #[test]
    fn test_in_place_transform() {
        let input = b"same file in and out".to_vec();
        let fx = Fixture::new(&input, b"\x42");
        let path = fx.path("input.bin");

        let job = Job::new(&path, &path, fx.path("key.bin"), 3);
        Coordinator::default().run(&job).unwrap();

        let mut expected = input;
        transform_in_place(&mut expected, b"\x42");
        assert_eq!(std::fs::read(&path).unwrap(), expected);
    }

    #[test]
    fn test_buffer_limit() {
        let fx = Fixture::new(&[0u8; 32], b"key");
        let mut coordinator = Coordinator::new(JobOptions {
            max_buffer_size: Some(16),
            ..Default::default()
        });

        let err = coordinator.run(&fx.job(2)).unwrap_err();
        assert!(matches!(err, TransformError::TooLarge { .. }));
        assert_eq!(err.status_code(), -12);
    }

    #[test]
    fn test_transform_file_roundtrip() {
        let input: Vec<u8> = (0..1000u32).map(|i| (i * 7 % 251) as u8).collect();
        let fx = Fixture::new(&input, b"repeating key");

        let status = transform_file(
            fx.path("input.bin"),
            fx.path("cipher.bin"),
            fx.path("key.bin"),
            5,
        );
        assert!(status.is_success());
        assert_ne!(std::fs::read(fx.path("cipher.bin")).unwrap(), input);

        let status = transform_file(
            fx.path("cipher.bin"),
            fx.path("plain.bin"),
            fx.path("key.bin"),
            3,
        );
        assert!(status.is_success());
        assert_eq!(std::fs::read(fx.path("plain.bin")).unwrap(), input);
    }

    #[test]
    fn test_missing_input_status() {
        let fx = Fixture::new(b"data", b"key");
        let status = transform_file(
            fx.path("absent.bin"),
            fx.path("output.bin"),
            fx.path("key.bin"),
            1,
        );
        assert_eq!(status.code(), -2);
        assert!(status.message().unwrap().contains("absent.bin"));
    }

    #[test]
    fn test_unallocatable_thread_count_status() {
        let fx = Fixture::new(b"data", b"key");
        let status = transform_file(
            fx.path("input.bin"),
            fx.path("output.bin"),
            fx.path("key.bin"),
            usize::MAX / 8,
        );
        assert_eq!(status.code(), -12);
        assert!(!fx.path("output.bin").exists());
    }

    #[test]
    fn test_job_state_display() {
        assert_eq!(JobState::Joining.to_string(), "Joining");
        assert!(JobState::Done.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(!JobState::Writing.is_terminal());
    }
}
