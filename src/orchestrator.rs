//! Background poll loop
//!
//! The orchestrator owns one worker thread that repeatedly captures a frame,
//! looks for the first enabled sequence whose opening step is visible, runs it
//! and then cools down. The controlling thread only flips the stop flag,
//! edits the enabled set and reads log messages.

use parking_lot::Mutex;
use std::any::Any;
use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::EngineConfig;
use crate::detector::Detector;
use crate::executor::{emit, ExecuteOptions, LogSink, SequenceOutcome, StopFlag};
use crate::templates::ActionSequence;
use crate::{EngineError, Result};

/// Granularity of interruptible sleeps
const TICK: Duration = Duration::from_millis(100);

/// Timing of the poll loop
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopSettings {
    /// Pause between polls when nothing was found
    pub poll_interval: Duration,
    /// Pause after each sequence run
    pub cooldown: Duration,
    pub execute: ExecuteOptions,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            cooldown: Duration::from_secs(2),
            execute: ExecuteOptions::default(),
        }
    }
}

impl From<&EngineConfig> for LoopSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            poll_interval: config.polling.poll_interval(),
            cooldown: config.polling.cooldown(),
            execute: ExecuteOptions::from(&config.execution),
        }
    }
}

/// Runs sequences on a worker thread
pub struct Orchestrator {
    /// Parked here while the worker is not running
    detector: Option<Detector>,
    sequences: Arc<Vec<ActionSequence>>,
    enabled: Arc<Mutex<BTreeSet<String>>>,
    settings: LoopSettings,
    stop: StopFlag,
    executions: Arc<AtomicU64>,
    log: Option<LogSink>,
    worker: Option<JoinHandle<Detector>>,
}

impl Orchestrator {
    /// Create an idle orchestrator with every sequence enabled
    pub fn new(detector: Detector, sequences: Vec<ActionSequence>) -> Self {
        let enabled = sequences.iter().map(|s| s.name().to_string()).collect();
        Self {
            detector: Some(detector),
            sequences: Arc::new(sequences),
            enabled: Arc::new(Mutex::new(enabled)),
            settings: LoopSettings::default(),
            stop: StopFlag::new(),
            executions: Arc::new(AtomicU64::new(0)),
            log: None,
            worker: None,
        }
    }

    /// Create an orchestrator using the timing and enabled list from `config`
    pub fn from_config(detector: Detector, sequences: Vec<ActionSequence>, config: &EngineConfig) -> Self {
        let orchestrator = Self::new(detector, sequences).with_settings(LoopSettings::from(config));
        if !config.polling.enabled.is_empty() {
            orchestrator.set_enabled_names(config.polling.enabled.iter().cloned());
        }
        orchestrator
    }

    pub fn with_settings(mut self, settings: LoopSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Forward every log message to `sink`
    pub fn with_log(mut self, sink: LogSink) -> Self {
        self.log = Some(sink);
        self
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    pub fn sequences(&self) -> &[ActionSequence] {
        &self.sequences
    }

    /// The detector, unless the worker currently owns it
    pub fn detector(&self) -> Option<&Detector> {
        self.detector.as_ref()
    }

    pub fn detector_mut(&mut self) -> Option<&mut Detector> {
        self.detector.as_mut()
    }

    /// Enable or disable one sequence; takes effect on the next poll
    pub fn set_enabled(&self, name: &str, enabled: bool) {
        let mut set = self.enabled.lock();
        if enabled {
            set.insert(name.to_string());
        } else {
            set.remove(name);
        }
    }

    /// Replace the enabled set
    pub fn set_enabled_names(&self, names: impl IntoIterator<Item = String>) {
        *self.enabled.lock() = names.into_iter().collect();
    }

    pub fn enabled(&self) -> BTreeSet<String> {
        self.enabled.lock().clone()
    }

    /// Sequences started since this orchestrator was created
    pub fn execution_count(&self) -> u64 {
        self.executions.load(Ordering::SeqCst)
    }

    /// Handle on the stop flag the worker polls
    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|worker| !worker.is_finished())
    }

    /// Start the worker thread
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(EngineError::AlreadyRunning);
        }
        // A worker that exited on its own still has to hand the detector back
        self.join_worker();

        if self.sequences.is_empty() {
            emit(self.log.as_ref(), "No sequences available.".to_string());
            return Err(EngineError::NothingToRun("no sequences available".to_string()));
        }

        let enabled = self.enabled();
        if enabled.is_empty() {
            emit(self.log.as_ref(), "No sequences enabled.".to_string());
            return Err(EngineError::NothingToRun("no sequences enabled".to_string()));
        }

        let Some(detector) = self.detector.take() else {
            return Err(EngineError::WorkerLost);
        };

        self.stop.clear();
        emit(self.log.as_ref(), "Started monitoring...".to_string());
        emit(
            self.log.as_ref(),
            format!(
                "Enabled: {}",
                enabled.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
            ),
        );

        let worker = Worker {
            sequences: self.sequences.clone(),
            enabled: self.enabled.clone(),
            settings: self.settings,
            stop: self.stop.clone(),
            executions: self.executions.clone(),
            log: self.log.clone(),
        };

        let handle = thread::Builder::new()
            .name("sightclick-worker".to_string())
            .spawn(move || worker.run(detector))?;
        self.worker = Some(handle);

        log::info!("Worker started");
        Ok(())
    }

    /// Stop the worker and wait for it to finish
    pub fn stop(&mut self) {
        if self.worker.is_none() {
            return;
        }
        emit(self.log.as_ref(), "Stopping...".to_string());
        self.stop.set();
        self.join_worker();
        log::info!("Worker stopped");
    }

    fn join_worker(&mut self) {
        if let Some(handle) = self.worker.take() {
            match handle.join() {
                Ok(detector) => self.detector = Some(detector),
                Err(_) => log::error!("Worker thread panicked; detector lost"),
            }
        }
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.stop();
    }
}

// =============================================================================
// Worker
// =============================================================================

struct Worker {
    sequences: Arc<Vec<ActionSequence>>,
    enabled: Arc<Mutex<BTreeSet<String>>>,
    settings: LoopSettings,
    stop: StopFlag,
    executions: Arc<AtomicU64>,
    log: Option<LogSink>,
}

impl Worker {
    fn run(self, mut detector: Detector) -> Detector {
        let mut total = 0u64;

        while !self.stop.is_set() {
            let polled = panic::catch_unwind(AssertUnwindSafe(|| self.poll(&mut detector, &mut total)));
            let error = match polled {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    log::error!("Poll panicked: {}", message);
                    format!("unexpected panic: {}", message)
                }
            };
            self.emit(format!("Error: {}", error));
            self.pause(self.settings.poll_interval);
        }

        self.emit(format!("Stopped. Total: {}", total));
        detector
    }

    /// One poll cycle, including the run and cooldown when something was found
    fn poll(&self, detector: &mut Detector, total: &mut u64) -> Result<()> {
        let enabled = self.enabled.lock().clone();
        if enabled.is_empty() {
            self.pause(self.settings.poll_interval);
            return Ok(());
        }

        let frame = detector.capture_frame()?;
        let Some(sequence) = detector.find_first_sequence(&self.sequences, &enabled, &frame) else {
            self.pause(self.settings.poll_interval);
            return Ok(());
        };

        *total += 1;
        self.executions.fetch_add(1, Ordering::SeqCst);
        self.emit(format!("Found '{}' (#{})", sequence.name(), total));

        match detector.execute(sequence, &self.settings.execute, &self.stop, self.log.as_ref()) {
            SequenceOutcome::Completed => self.emit("Completed!".to_string()),
            SequenceOutcome::Failed => self.emit("Incomplete".to_string()),
            SequenceOutcome::Stopped => {}
        }

        self.pause(self.settings.cooldown);
        Ok(())
    }

    /// Sleep in short ticks, returning early once stop is requested
    fn pause(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while !self.stop.is_set() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep(TICK.min(deadline - now));
        }
    }

    fn emit(&self, message: String) {
        emit(self.log.as_ref(), message);
    }
}

/// Text of a panic payload raised with `panic!`
fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
