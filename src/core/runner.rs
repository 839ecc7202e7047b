//! Autosplitter runner
//!
//! Owns the capture scheduler: a worker thread that runs one matching cycle,
//! waits for the capture interval, and repeats until the session is
//! exhausted, fails or is stopped.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::events::{EventCallback, EventHandler, SessionEvent, SplitEvent, Termination};
use super::session::{CycleOutcome, MatchSession};
use super::state::{SessionSnapshot, SessionStatus};
use crate::config::SessionConfig;
use crate::error::{AutosplitterError, Result};
use crate::vision::{CaptureProvider, CaptureSource, FrameSequenceCapture};

/// How often the worker logs cycle statistics
const STATS_INTERVAL: Duration = Duration::from_secs(5);

/// Replay configuration for offline runs
#[derive(Debug, Clone)]
pub struct TestModeConfig {
    /// Directory of still frames, played in file-name order
    pub source_path: PathBuf,
    /// Start over after the last frame
    pub loop_playback: bool,
}

/// Gate plus the queue feeding the event dispatcher. Events are queued
/// under this lock and delivered on the dispatcher thread, so once the gate
/// closes no split can be queued, and no listener ever runs while the lock
/// is held.
struct EventSink {
    /// Sender side of the dispatcher queue, created on first start
    tx: Option<Sender<SessionEvent>>,
    open: bool,
}

impl EventSink {
    fn queue(&self, event: SessionEvent) {
        match &self.tx {
            Some(tx) => {
                if tx.send(event).is_err() {
                    log::warn!("Event dispatcher has exited, event dropped");
                }
            }
            None => log::warn!("No event dispatcher, event dropped"),
        }
    }

    fn emit_split(&self, event: SplitEvent) -> bool {
        if !self.open {
            return false;
        }
        self.queue(SessionEvent::Split(event));
        true
    }

    /// Close the gate and announce why. Only the first call has an effect.
    fn terminate(&mut self, termination: Termination) -> bool {
        if !self.open {
            return false;
        }
        self.open = false;
        self.queue(SessionEvent::Terminated(termination));
        true
    }
}

/// Start the thread that hands queued events to the listeners, in order.
/// It exits once every sender is gone.
fn spawn_dispatcher(listeners: Arc<Mutex<EventHandler>>) -> Result<Sender<SessionEvent>> {
    let (tx, rx) = mpsc::channel::<SessionEvent>();
    thread::Builder::new()
        .name("autosplitter-events".to_string())
        .spawn(move || {
            for event in rx {
                let handler = listeners.lock().clone();
                if !handler.has_listeners() {
                    log::debug!("No listeners for {:?}", event);
                    continue;
                }
                handler.emit(event);
            }
            log::debug!("Event dispatcher finished");
        })
        .map_err(|e| AutosplitterError::WorkerSpawn(format!("event dispatcher: {}", e)))?;
    Ok(tx)
}

/// Vision autosplitter driving one session at a time
pub struct Autosplitter {
    /// Running flag, cleared by `stop` or by the worker on termination
    running: Arc<AtomicBool>,
    /// Registered listeners, shared with the dispatcher
    listeners: Arc<Mutex<EventHandler>>,
    /// Open/closed gate and the dispatcher queue
    events: Arc<Mutex<EventSink>>,
    /// Latest progress published by the worker
    snapshot: Arc<Mutex<SessionSnapshot>>,
    /// Wakes the worker out of its inter-cycle wait when dropped
    stop_tx: Option<Sender<()>>,
    /// Worker thread handle
    worker: Option<JoinHandle<()>>,
}

impl Autosplitter {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            listeners: Arc::new(Mutex::new(EventHandler::new())),
            events: Arc::new(Mutex::new(EventSink {
                tx: None,
                open: false,
            })),
            snapshot: Arc::new(Mutex::new(SessionSnapshot::new())),
            stop_tx: None,
            worker: None,
        }
    }

    /// Register a listener for split and termination events
    pub fn on_event<F>(&self, callback: F)
    where
        F: Fn(SessionEvent) + Send + Sync + 'static,
    {
        let callback: EventCallback = Arc::new(callback);
        self.listeners.lock().on_event(callback);
    }

    /// Start a session.
    ///
    /// The configuration is checked before the capture surface is opened,
    /// so a session that cannot run never acquires one.
    pub fn start(&mut self, config: SessionConfig, provider: &dyn CaptureProvider) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(AutosplitterError::AlreadyRunning);
        }
        // Reap a worker that finished on its own
        self.join_worker();

        let session = MatchSession::new(&config)?;
        self.ensure_dispatcher()?;
        let source = provider.open()?;
        let interval = Duration::from_millis(config.effective_interval_ms());

        self.spawn(session, source, interval)
    }

    /// Start a session against a directory of recorded frames
    pub fn start_test_mode(&mut self, config: SessionConfig, test_config: TestModeConfig) -> Result<()> {
        let provider = || -> Result<Box<dyn CaptureSource>> {
            let capture = FrameSequenceCapture::from_directory(
                &test_config.source_path,
                test_config.loop_playback,
            )?;
            log::info!(
                "Test capture source created: {:?} ({} frames)",
                test_config.source_path,
                capture.len()
            );
            Ok(Box::new(capture))
        };
        self.start(config, &provider)
    }

    fn ensure_dispatcher(&self) -> Result<()> {
        let mut sink = self.events.lock();
        if sink.tx.is_none() {
            sink.tx = Some(spawn_dispatcher(self.listeners.clone())?);
        }
        Ok(())
    }

    fn spawn(
        &mut self,
        session: MatchSession,
        source: Box<dyn CaptureSource>,
        interval: Duration,
    ) -> Result<()> {
        {
            let mut snapshot = self.snapshot.lock();
            *snapshot = SessionSnapshot {
                category: session.category().to_string(),
                status: SessionStatus::Running,
                matched: 0,
                total: session.targets().len(),
                current_target: session.current_target().map(|t| t.name.clone()),
                last_score: None,
                cycles: 0,
            };
        }
        self.events.lock().open = true;
        self.running.store(true, Ordering::SeqCst);

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let worker = CaptureWorker {
            session,
            source,
            interval,
            running: self.running.clone(),
            events: self.events.clone(),
            snapshot: self.snapshot.clone(),
        };

        log::info!(
            "Autosplitter started for '{}': {} targets, threshold {:.2}, every {}ms",
            worker.session.category(),
            worker.session.targets().len(),
            worker.session.threshold(),
            interval.as_millis()
        );

        let handle = thread::Builder::new()
            .name("autosplitter".to_string())
            .spawn(move || worker.run(stop_rx));

        match handle {
            Ok(handle) => {
                self.stop_tx = Some(stop_tx);
                self.worker = Some(handle);
                Ok(())
            }
            Err(e) => {
                // The worker closure, and with it the capture source, was dropped
                self.running.store(false, Ordering::SeqCst);
                self.events.lock().open = false;
                let error = AutosplitterError::WorkerSpawn(format!("capture worker: {}", e));
                self.snapshot.lock().status = SessionStatus::Failed(error.to_string());
                Err(error)
            }
        }
    }

    /// Stop the session. Safe to call at any time and more than once.
    ///
    /// A cycle already in progress is allowed to finish but its result is
    /// discarded. Returns once the capture surface has been released.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        // Dropping the sender ends the worker's wait immediately
        self.stop_tx = None;

        let cancelled = {
            let mut sink = self.events.lock();
            if sink.open {
                self.snapshot.lock().status = SessionStatus::Cancelled;
            }
            sink.terminate(Termination::Cancelled)
        };
        if cancelled {
            log::info!("Autosplitter stopped");
        }

        self.join_worker();
    }

    fn join_worker(&mut self) {
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                log::error!("Autosplitter worker panicked");
            }
        }
    }

    /// Check if a session is active
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Copy of the latest published progress
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.lock().clone()
    }
}

impl Default for Autosplitter {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Autosplitter {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Everything the worker thread owns for the lifetime of a session
struct CaptureWorker {
    session: MatchSession,
    source: Box<dyn CaptureSource>,
    interval: Duration,
    running: Arc<AtomicBool>,
    events: Arc<Mutex<EventSink>>,
    snapshot: Arc<Mutex<SessionSnapshot>>,
}

impl CaptureWorker {
    /// Fixed-delay loop: the wait starts after a cycle finishes, so a slow
    /// cycle never causes work to pile up.
    fn run(mut self, stop_rx: mpsc::Receiver<()>) {
        let mut cycles: u64 = 0;
        let mut skipped: u64 = 0;
        let mut last_log = Instant::now();

        while self.running.load(Ordering::SeqCst) {
            let outcome = self.session.run_cycle(self.source.as_mut());
            cycles += 1;

            if !self.running.load(Ordering::SeqCst) {
                log::debug!("Discarding cycle result after stop");
                break;
            }

            let finished = match outcome {
                CycleOutcome::Split(trigger) => {
                    log::info!(
                        "Split {} '{}' detected (score {:.3} at {:?})",
                        trigger.index,
                        trigger.name,
                        trigger.result.score,
                        trigger.result.location
                    );
                    self.publish(cycles, Some(trigger.result.score));
                    let index = trigger.index;
                    let event = SplitEvent::new(index, trigger.name, trigger.result.score);
                    let delivered = if trigger.exhausted {
                        self.finish(Some(event), Termination::Exhausted)
                    } else {
                        self.events.lock().emit_split(event)
                    };
                    if !delivered {
                        log::debug!("Session closed before split {} was delivered", index);
                        break;
                    }
                    trigger.exhausted
                }
                CycleOutcome::NoMatch(result) => {
                    log::trace!("No match: score {:.3}", result.score);
                    self.publish(cycles, Some(result.score));
                    false
                }
                CycleOutcome::Skipped(e) => {
                    skipped += 1;
                    match e {
                        AutosplitterError::TemplateUnreadable { .. } => log::warn!("Cycle skipped: {}", e),
                        _ => log::debug!("Cycle skipped: {}", e),
                    }
                    self.publish(cycles, None);
                    false
                }
                CycleOutcome::Fatal(e) => {
                    self.publish(cycles, None);
                    self.finish(None, Termination::Failed(e));
                    true
                }
                CycleOutcome::Exhausted => {
                    self.finish(None, Termination::Exhausted);
                    true
                }
            };

            if finished {
                break;
            }

            if last_log.elapsed() >= STATS_INTERVAL {
                log::info!(
                    "Autosplitter: {} cycles, {} skipped, waiting for {:?}",
                    cycles,
                    skipped,
                    self.session.current_target().map(|t| t.name.as_str())
                );
                last_log = Instant::now();
            }

            match stop_rx.recv_timeout(self.interval) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        log::debug!("Releasing capture source after {} cycles", cycles);
        // `self.source` is dropped here, exactly once
    }

    fn publish(&self, cycles: u64, score: Option<f32>) {
        let mut snapshot = self.snapshot.lock();
        snapshot.cycles = cycles;
        snapshot.matched = self.session.cursor().position();
        snapshot.current_target = self.session.current_target().map(|t| t.name.clone());
        if score.is_some() {
            snapshot.last_score = score;
        }
    }

    /// Close the session from the worker side, delivering `last_split`
    /// first when there is one. Everything happens under one lock, so a
    /// concurrent `stop` can neither slip between the final split and its
    /// termination nor replace the reason with `Cancelled`. Returns false
    /// when the session was already closed.
    fn finish(&self, last_split: Option<SplitEvent>, termination: Termination) -> bool {
        let mut sink = self.events.lock();
        if !sink.open {
            return false;
        }

        if let Some(event) = last_split {
            sink.emit_split(event);
        }
        match &termination {
            Termination::Exhausted => {
                log::info!("All {} splits detected", self.session.targets().len())
            }
            Termination::Failed(e) => log::error!("Autosplitter stopped: {}", e),
            Termination::Cancelled => {}
        }
        self.snapshot.lock().status = match &termination {
            Termination::Exhausted => SessionStatus::Finished,
            Termination::Cancelled => SessionStatus::Cancelled,
            Termination::Failed(e) => SessionStatus::Failed(e.to_string()),
        };
        self.running.store(false, Ordering::SeqCst);
        sink.terminate(termination)
    }
}
