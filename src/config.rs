//! Global configuration for the orchestration core.
//!
//! Mirrors [`cloudllm::config::CloudLLMConfig`] in spirit: a plain struct
//! built with `with_*` builder methods, constructed programmatically. No
//! TOML/YAML/JSON config-file parsing dependency is introduced — callers
//! that want file-based config load it themselves and populate this struct.
//!
//! Every row of spec.md §6's configuration table has a field here.
//!
//! # Example
//!
//! ```rust
//! use agentforge_core::config::CoreConfig;
//!
//! let config = CoreConfig::default()
//!     .with_workers(4, 2)
//!     .with_approval_timeout_ms(60_000)
//!     .with_max_feedback_rounds(3);
//!
//! assert_eq!(config.workers_regular, 4);
//! assert_eq!(config.workers_premium, 2);
//! ```

/// Tunables recognized by the core, per spec.md §6.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// `workers.regular` — worker count for the regular lane.
    pub workers_regular: usize,
    /// `workers.premium` — worker count for the premium lane.
    pub workers_premium: usize,
    /// `queue.maxAttempts` — retries for transient backend errors.
    pub queue_max_attempts: u32,
    /// `approval.defaultTimeoutMs` — `0` means wait forever.
    pub approval_default_timeout_ms: u64,
    /// `approval.maxFeedbackRounds` — cap per checkpoint (§4.3's `R`).
    pub approval_max_feedback_rounds: u32,
    /// `activity.bufferSize` — ring buffer length `N` (§4.2, §3 invariant 7).
    pub activity_buffer_size: usize,
    /// `activity.batchMs` — batching window `B` (§4.2).
    pub activity_batch_ms: u64,
    /// `activity.throttleMs` — per-`(task, type)` throttle window `H` (§4.2).
    pub activity_throttle_ms: u64,
    /// `observer.loopThreshold` — loop detector threshold `T` (§4.4).
    pub observer_loop_threshold: u32,
    /// `observer.loopWindowMs` — loop detector rolling window `W` (§4.4).
    pub observer_loop_window_ms: u64,
    /// `observer.scan.maxFiles` — workspace scan file-count cap.
    pub observer_scan_max_files: usize,
    /// `observer.scan.maxFileKB` — workspace scan per-file size cap.
    pub observer_scan_max_file_kb: usize,
    /// `observer.scan.depth` — workspace scan directory depth cap.
    pub observer_scan_depth: usize,
    /// `phase.idleTimeoutMs` — code-agent idle-wait safety net (default 30 min).
    pub phase_idle_timeout_ms: u64,
    /// `developer.maxIterations` — Developer's DEV/JUDGE/OBSERVE/FIX cap.
    pub developer_max_iterations: u32,
    /// `planning.maxJudgeIterations` — Planning's judge-and-fix cap.
    pub planning_max_judge_iterations: u32,
    /// `testgen.maxIterations` — TestGeneration's iteration cap.
    pub testgen_max_iterations: u32,
    /// `testgen.enabled` — TestGeneration is the other phase the orchestrator
    /// may skip (spec.md §4.5), by option rather than a complexity assessment.
    pub testgen_enabled: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            workers_regular: 4,
            workers_premium: 2,
            queue_max_attempts: 1,
            approval_default_timeout_ms: 0,
            approval_max_feedback_rounds: 3,
            activity_buffer_size: 500,
            activity_batch_ms: 250,
            activity_throttle_ms: 1_000,
            observer_loop_threshold: 10,
            observer_loop_window_ms: 30_000,
            observer_scan_max_files: 5_000,
            observer_scan_max_file_kb: 512,
            observer_scan_depth: 5,
            phase_idle_timeout_ms: 30 * 60 * 1_000,
            developer_max_iterations: 3,
            planning_max_judge_iterations: 3,
            testgen_max_iterations: 3,
            testgen_enabled: true,
        }
    }
}

impl CoreConfig {
    pub fn with_workers(mut self, regular: usize, premium: usize) -> Self {
        self.workers_regular = regular;
        self.workers_premium = premium;
        self
    }

    pub fn with_queue_max_attempts(mut self, attempts: u32) -> Self {
        self.queue_max_attempts = attempts;
        self
    }

    pub fn with_approval_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.approval_default_timeout_ms = timeout_ms;
        self
    }

    pub fn with_max_feedback_rounds(mut self, rounds: u32) -> Self {
        self.approval_max_feedback_rounds = rounds;
        self
    }

    pub fn with_activity_buffer(mut self, size: usize, batch_ms: u64, throttle_ms: u64) -> Self {
        self.activity_buffer_size = size;
        self.activity_batch_ms = batch_ms;
        self.activity_throttle_ms = throttle_ms;
        self
    }

    pub fn with_loop_detector(mut self, threshold: u32, window_ms: u64) -> Self {
        self.observer_loop_threshold = threshold;
        self.observer_loop_window_ms = window_ms;
        self
    }

    pub fn with_scan_limits(mut self, max_files: usize, max_file_kb: usize, depth: usize) -> Self {
        self.observer_scan_max_files = max_files;
        self.observer_scan_max_file_kb = max_file_kb;
        self.observer_scan_depth = depth;
        self
    }

    pub fn with_idle_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.phase_idle_timeout_ms = timeout_ms;
        self
    }

    pub fn with_testgen_enabled(mut self, enabled: bool) -> Self {
        self.testgen_enabled = enabled;
        self
    }
}
