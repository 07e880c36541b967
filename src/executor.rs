//! Sequence execution
//!
//! A sequence runs as a small state machine: wait for step `i` to appear,
//! click it, pause, move on. Each step has its own timeout. The stop flag is
//! checked once per poll, so a stop request lands within one check interval
//! plus whatever match or click is in flight.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use crate::capture::CaptureFrame;
use crate::config::ExecutionConfig;
use crate::detector::Detector;
use crate::templates::ActionSequence;

/// Receiver side of the engine's human-readable log
pub type LogSink = mpsc::Sender<String>;

/// Shared cooperative stop signal
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every holder of this flag to stop
    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Timing for one sequence run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecuteOptions {
    /// Pause after each click
    pub step_delay: Duration,
    /// How long to wait for each step to appear
    pub timeout_per_step: Duration,
    /// Pause between captures while waiting
    pub check_interval: Duration,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            step_delay: Duration::from_millis(500),
            timeout_per_step: Duration::from_secs(10),
            check_interval: Duration::from_millis(300),
        }
    }
}

impl From<&ExecutionConfig> for ExecuteOptions {
    fn from(config: &ExecutionConfig) -> Self {
        Self {
            step_delay: config.step_delay(),
            timeout_per_step: config.timeout_per_step(),
            check_interval: config.check_interval(),
        }
    }
}

/// How a sequence run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceOutcome {
    /// Every step was clicked
    Completed,
    /// A step did not appear before its timeout
    Failed,
    /// The stop flag was raised
    Stopped,
}

impl SequenceOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, SequenceOutcome::Completed)
    }
}

/// Send a message to the log facade and, if present, to the sink
pub(crate) fn emit(log: Option<&LogSink>, message: String) {
    log::info!("{}", message);
    if let Some(sink) = log {
        // A dropped receiver only means nobody is listening any more
        let _ = sink.send(message);
    }
}

// =============================================================================
// Execution
// =============================================================================

impl Detector {
    /// Run every step of `sequence` in order
    pub fn execute(
        &mut self,
        sequence: &ActionSequence,
        options: &ExecuteOptions,
        stop: &StopFlag,
        log: Option<&LogSink>,
    ) -> SequenceOutcome {
        emit(log, format!("Executing: {}", sequence.name()));

        let total = sequence.action_count();
        for (index, template) in sequence.templates().iter().enumerate() {
            let step = index + 1;
            let started = Instant::now();

            loop {
                if started.elapsed() >= options.timeout_per_step {
                    emit(
                        log,
                        format!("[{}/{}] Timeout: '{}'", step, total, template.name()),
                    );
                    return SequenceOutcome::Failed;
                }

                if stop.is_set() {
                    emit(log, "Stopped by user".to_string());
                    return SequenceOutcome::Stopped;
                }

                match self.capture_frame() {
                    Ok(frame) => match self.find_and_click(template, &frame) {
                        Ok(result) if result.found => {
                            let (x, y) = result.center();
                            emit(
                                log,
                                format!(
                                    "[{}/{}] Clicked '{}' at ({}, {})",
                                    step,
                                    total,
                                    template.name(),
                                    x,
                                    y
                                ),
                            );
                            break;
                        }
                        Ok(_) => {}
                        Err(e) => log::warn!("Click on '{}' failed: {}", template.name(), e),
                    },
                    Err(e) => log::warn!("Capture failed: {}", e),
                }

                thread::sleep(options.check_interval);
            }

            thread::sleep(options.step_delay);
        }

        SequenceOutcome::Completed
    }

    /// First enabled sequence whose opening template is visible in `frame`
    ///
    /// Sequences are tried in the given order; only the first template of
    /// each is consulted.
    pub fn find_first_sequence<'a>(
        &mut self,
        sequences: &'a [ActionSequence],
        enabled: &BTreeSet<String>,
        frame: &CaptureFrame,
    ) -> Option<&'a ActionSequence> {
        sequences
            .iter()
            .filter(|sequence| enabled.contains(sequence.name()))
            .find(|sequence| {
                sequence
                    .first()
                    .is_some_and(|template| self.find(template, frame).found)
            })
    }
}
