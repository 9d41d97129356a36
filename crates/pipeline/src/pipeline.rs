//! Pipeline lifecycle state machine
//!
//! `Idle` ⇄ `Active`. Every public operation takes the instance lock. The
//! one exception is the blocking part of `wait_for_frames`: the lock is
//! released while the caller sleeps on the queue, then re-acquired to judge
//! the timeout. Sessions carry a generation number so a waiter can tell
//! whether the session it waited on is still the active one.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use contracts::{ContractError, Device, FrameSet, Result};
use observability::metrics::{record_reconnect, record_start_attempt, record_wait_timeout};
use sync_engine::{SyncStats, Synchronizer};
use tracing::{debug, error, info, instrument, warn};

use crate::config::Config;
use crate::context::PipelineContext;
use crate::profile::Profile;
use crate::queue::{FrameQueue, QueueSnapshot, WaitOutcome};

enum PipelineState {
    Idle,
    Active(Session),
}

/// Everything owned by one `Active` period
struct Session {
    generation: u64,
    config: Arc<Config>,
    profile: Arc<Profile>,
    sync: Arc<Synchronizer>,
    queue: Arc<FrameQueue>,
}

impl Session {
    /// Stop and close the binding. The Synchronizer and queue go with `self`.
    fn release(self) -> Result<()> {
        let binding = self.profile.binding();
        let stopped = binding.stop();
        let closed = binding.close();

        let sync = self.sync.stats();
        let queue = self.queue.snapshot();
        debug!(
            generation = self.generation,
            frames_in = sync.frames_in,
            framesets = sync.framesets_out,
            sync_dropped = sync.frames_dropped,
            queue_dropped = queue.dropped,
            delivered = queue.delivered,
            "session released"
        );
        stopped.and(closed)
    }
}

/// Streaming pipeline
pub struct Pipeline {
    ctx: PipelineContext,
    state: Mutex<PipelineState>,
    generations: AtomicU64,
}

impl Pipeline {
    pub fn new(ctx: PipelineContext) -> Self {
        Self {
            ctx,
            state: Mutex::new(PipelineState::Idle),
            generations: AtomicU64::new(0),
        }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    /// Resolve, open and start `config`, retrying transient failures.
    ///
    /// # Errors
    /// `WrongCallSequence` when already active; otherwise the error of the
    /// last attempt.
    #[instrument(name = "pipeline_start", skip(self, config))]
    pub fn start(&self, config: Arc<Config>) -> Result<Arc<Profile>> {
        let mut state = self.lock();
        Self::ensure_idle(&state)?;
        self.start_locked(&mut state, config)
    }

    /// Start while recording the session to `path`.
    ///
    /// The record target is only added to `config` once the pipeline is
    /// known to be idle.
    pub fn start_with_record(&self, config: Arc<Config>, path: impl AsRef<Path>) -> Result<Arc<Profile>> {
        let mut state = self.lock();
        Self::ensure_idle(&state)?;
        config.enable_record_to_file(path)?;
        self.start_locked(&mut state, config)
    }

    fn ensure_idle(state: &PipelineState) -> Result<()> {
        match state {
            PipelineState::Idle => Ok(()),
            PipelineState::Active(_) => Err(ContractError::wrong_call_sequence(
                "start",
                "cannot be called before stop()",
            )),
        }
    }

    fn start_locked(
        &self,
        state: &mut MutexGuard<'_, PipelineState>,
        config: Arc<Config>,
    ) -> Result<Arc<Profile>> {
        let session = self.start_with_retry(config)?;
        let profile = session.profile.clone();
        info!(
            generation = session.generation,
            streams = profile.active_streams().len(),
            "pipeline started"
        );
        **state = PipelineState::Active(session);
        Ok(profile)
    }

    #[instrument(name = "pipeline_stop", skip(self))]
    pub fn stop(&self) -> Result<()> {
        let mut state = self.lock();
        match std::mem::replace(&mut *state, PipelineState::Idle) {
            PipelineState::Idle => Err(ContractError::wrong_call_sequence(
                "stop",
                "cannot be called before start()",
            )),
            PipelineState::Active(session) => {
                let result = session.release();
                info!("pipeline stopped");
                result
            }
        }
    }

    /// Block up to `timeout` for the next frame set.
    ///
    /// `Ok(None)` means the device was found disconnected and the pipeline
    /// restarted (or another caller already restarted it); wait again.
    ///
    /// # Errors
    /// - `WrongCallSequence` when idle, or stopped during the wait
    /// - `Timeout` when nothing arrived and the device is still connected
    /// - the restart error when recovery exhausted its attempts
    #[instrument(
        name = "pipeline_wait_for_frames",
        level = "debug",
        skip(self),
        fields(timeout_ms = timeout.as_millis() as u64)
    )]
    pub fn wait_for_frames(&self, timeout: Duration) -> Result<Option<FrameSet>> {
        let (consumer, generation) = {
            let state = self.lock();
            match &*state {
                PipelineState::Idle => {
                    return Err(ContractError::wrong_call_sequence(
                        "wait_for_frames",
                        "cannot be called before start()",
                    ))
                }
                PipelineState::Active(session) => (session.queue.consumer(), session.generation),
            }
        };

        match consumer.wait(timeout) {
            Ok(set) => return Ok(Some(set)),
            Err(WaitOutcome::Closed) => debug!(generation, "queue closed while waiting"),
            Err(WaitOutcome::TimedOut) => {}
        }
        drop(consumer);

        let mut state = self.lock();
        let stale = match std::mem::replace(&mut *state, PipelineState::Idle) {
            PipelineState::Idle => {
                return Err(ContractError::wrong_call_sequence(
                    "wait_for_frames",
                    "pipeline was stopped while waiting",
                ))
            }
            PipelineState::Active(session) if session.generation != generation => {
                debug!(generation, current = session.generation, "session restarted while waiting");
                *state = PipelineState::Active(session);
                return Ok(None);
            }
            PipelineState::Active(session) => session,
        };

        if self.ctx.hub().is_connected(stale.profile.device().as_ref()) {
            *state = PipelineState::Active(stale);
            record_wait_timeout();
            return Err(ContractError::timeout(
                timeout.as_millis() as u64,
                "wait_for_frames",
            ));
        }

        warn!(generation, "device disconnected, restarting pipeline");
        let config = stale.config.clone();
        if let Err(e) = stale.release() {
            debug!(error = %e, "stale session release failed");
        }

        match self.start_with_retry(config) {
            Ok(session) => {
                record_reconnect(true);
                info!(generation = session.generation, "pipeline recovered");
                *state = PipelineState::Active(session);
                Ok(None)
            }
            Err(e) => {
                record_reconnect(false);
                error!(error = %e, "pipeline recovery failed");
                Err(e)
            }
        }
    }

    /// Next frame set if one is queued; never blocks
    pub fn poll_for_frames(&self) -> Result<Option<FrameSet>> {
        let state = self.lock();
        match &*state {
            PipelineState::Idle => Err(ContractError::wrong_call_sequence(
                "poll_for_frames",
                "cannot be called before start()",
            )),
            PipelineState::Active(session) => Ok(session.queue.try_pop()),
        }
    }

    pub fn active_profile(&self) -> Option<Arc<Profile>> {
        match &*self.lock() {
            PipelineState::Idle => None,
            PipelineState::Active(session) => Some(session.profile.clone()),
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(*self.lock(), PipelineState::Active(_))
    }

    /// Device of the active profile
    pub fn device(&self) -> Result<Arc<dyn Device>> {
        self.active_profile()
            .map(|profile| profile.device())
            .ok_or_else(|| ContractError::device_unavailable("pipeline is not streaming"))
    }

    /// Pass-through to the device hub
    pub fn wait_for_device(&self, timeout: Duration, serial: Option<&str>) -> Result<Arc<dyn Device>> {
        self.ctx.hub().wait_for_device(timeout, serial)
    }

    pub fn queue_stats(&self) -> Option<QueueSnapshot> {
        match &*self.lock() {
            PipelineState::Idle => None,
            PipelineState::Active(session) => Some(session.queue.snapshot()),
        }
    }

    pub fn sync_stats(&self) -> Option<SyncStats> {
        match &*self.lock() {
            PipelineState::Idle => None,
            PipelineState::Active(session) => Some(session.sync.stats()),
        }
    }

    fn start_with_retry(&self, config: Arc<Config>) -> Result<Session> {
        let attempts = self.ctx.settings().start_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.try_start(&config) {
                Ok(session) => {
                    record_start_attempt(attempt, "ok");
                    return Ok(session);
                }
                Err(e) if attempt < attempts && e.is_retryable() => {
                    record_start_attempt(attempt, "retry");
                    warn!(attempt, attempts, error = %e, "start attempt failed, retrying");
                    attempt += 1;
                }
                Err(e) => {
                    record_start_attempt(attempt, "failed");
                    warn!(attempt, kind = e.kind(), error = %e, "pipeline start failed");
                    return Err(e);
                }
            }
        }
    }

    /// One {resolve → open → start} attempt
    fn try_start(&self, config: &Arc<Config>) -> Result<Session> {
        let settings = self.ctx.settings();
        let profile = config.resolve(&self.ctx)?;

        let queue = Arc::new(FrameQueue::new(&settings.queue));
        let sink = queue.clone();
        let sync = Arc::new(Synchronizer::new(
            &profile.active_streams(),
            &settings.sync,
            Arc::new(move |set: FrameSet| {
                sink.push(set);
            }),
        ));

        let binding = profile.binding();
        binding.open()?;
        if let Err(e) = binding.start(sync.frame_callback()) {
            if let Err(close_err) = binding.close() {
                debug!(error = %close_err, "close after failed start failed");
            }
            return Err(e);
        }

        Ok(Session {
            generation: self.generations.fetch_add(1, Ordering::SeqCst) + 1,
            config: config.clone(),
            profile,
            sync,
            queue,
        })
    }

    fn lock(&self) -> MutexGuard<'_, PipelineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let PipelineState::Active(session) = std::mem::replace(state, PipelineState::Idle) {
            if let Err(e) = session.release() {
                debug!(error = %e, "stop during teardown failed");
            }
        }
    }
}
