// Visual sync bridge - Beat highlights applied when the beat is heard
//
// The scheduler commits beats up to 100ms ahead of the audio clock. Each
// beat's highlight is sent to a timer thread with a wall-clock deadline equal
// to the beat's distance from "now" on the audio clock. Every update carries
// the session generation it was scheduled under; bumping the generation
// cancels all outstanding updates at once.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use log::{debug, error};
use parking_lot::Mutex;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::transport::TransportState;

/// Which row of the indicator a highlight belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeatPhase {
    /// Count-in beat, index 0..3
    CountIn,
    /// Pattern step, index 0..15
    Pattern,
}

/// The beat the UI should highlight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisualBeat {
    pub index: usize,
    pub phase: BeatPhase,
}

impl VisualBeat {
    pub fn count_in(index: usize) -> Self {
        Self {
            index,
            phase: BeatPhase::CountIn,
        }
    }

    pub fn step(index: usize) -> Self {
        Self {
            index,
            phase: BeatPhase::Pattern,
        }
    }
}

/// A deferred change to the display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisualUpdate {
    pub beat: VisualBeat,
    /// Switch CountingIn -> Running when this update lands
    pub enters_running: bool,
}

/// What a UI reads each frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplaySnapshot {
    pub beat: Option<VisualBeat>,
    pub transport: TransportState,
    pub generation: u64,
}

#[derive(Debug, Default)]
struct DisplayState {
    generation: u64,
    beat: Option<VisualBeat>,
    transport: TransportState,
}

/// Read handle on the beat indicator state
#[derive(Clone, Debug, Default)]
pub struct SharedDisplay {
    inner: Arc<Mutex<DisplayState>>,
}

impl SharedDisplay {
    pub fn snapshot(&self) -> DisplaySnapshot {
        let state = self.inner.lock();
        DisplaySnapshot {
            beat: state.beat,
            transport: state.transport,
            generation: state.generation,
        }
    }

    pub fn highlighted(&self) -> Option<VisualBeat> {
        self.inner.lock().beat
    }

    pub fn transport(&self) -> TransportState {
        self.inner.lock().transport
    }

    /// Bump the generation and set the transport state; returns the new generation
    fn advance_generation(&self, transport: TransportState, clear_highlight: bool) -> u64 {
        let mut state = self.inner.lock();
        state.generation += 1;
        state.transport = transport;
        if clear_highlight {
            state.beat = None;
        }
        state.generation
    }

    /// Apply an update unless its generation is stale
    fn apply(&self, generation: u64, update: VisualUpdate) -> bool {
        let mut state = self.inner.lock();
        if state.generation != generation {
            return false;
        }
        state.beat = Some(update.beat);
        if update.enters_running && state.transport == TransportState::CountingIn {
            state.transport = TransportState::Running;
        }
        true
    }
}

#[derive(Debug)]
struct PendingUpdate {
    deadline: Instant,
    sequence: u64,
    generation: u64,
    update: VisualUpdate,
}

impl PartialEq for PendingUpdate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PendingUpdate {}

impl PartialOrd for PendingUpdate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingUpdate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.deadline
            .cmp(&other.deadline)
            .then(self.sequence.cmp(&other.sequence))
    }
}

enum TimerCommand {
    Schedule(PendingUpdate),
    Shutdown,
}

/// Deferred, cancellable highlight updates
pub struct VisualSync {
    display: SharedDisplay,
    timer_tx: Sender<TimerCommand>,
    pending: Arc<AtomicUsize>,
    sequence: u64,
    worker: Option<JoinHandle<()>>,
}

impl VisualSync {
    pub fn new() -> io::Result<Self> {
        let display = SharedDisplay::default();
        let pending = Arc::new(AtomicUsize::new(0));
        let (timer_tx, timer_rx) = crossbeam_channel::unbounded();

        let worker_display = display.clone();
        let worker_pending = Arc::clone(&pending);
        let worker = thread::Builder::new()
            .name("visual-sync".to_string())
            .spawn(move || run_timer(timer_rx, worker_display, worker_pending))?;

        Ok(Self {
            display,
            timer_tx,
            pending,
            sequence: 0,
            worker: Some(worker),
        })
    }

    /// Delay between "now" and a beat at `audio_time`, never negative
    pub fn delay_until(audio_time: f64, now: f64) -> Duration {
        Duration::from_secs_f64((audio_time - now).max(0.0))
    }

    pub fn display(&self) -> SharedDisplay {
        self.display.clone()
    }

    /// New session from a standstill: cancel everything, clear the highlight
    pub fn start_session(&self, transport: TransportState) -> u64 {
        self.display.advance_generation(transport, true)
    }

    /// Settings changed mid-session: cancel everything, keep the highlight
    pub fn resync_session(&self, transport: TransportState) -> u64 {
        self.display.advance_generation(transport, false)
    }

    /// Cancel everything and return to the "no beat highlighted" state
    pub fn reset(&self) {
        let generation = self
            .display
            .advance_generation(TransportState::Stopped, true);
        debug!("Visual sync reset (generation {generation})");
    }

    /// Arrange for `update` to land after `delay`
    pub fn schedule(&mut self, generation: u64, delay: Duration, update: VisualUpdate) {
        self.sequence += 1;
        let pending = PendingUpdate {
            deadline: Instant::now() + delay,
            sequence: self.sequence,
            generation,
            update,
        };

        self.pending.fetch_add(1, AtomicOrdering::Relaxed);
        if self.timer_tx.send(TimerCommand::Schedule(pending)).is_err() {
            self.pending.fetch_sub(1, AtomicOrdering::Relaxed);
            error!("Visual sync timer thread is gone, dropping highlight");
        }
    }

    /// Updates handed to the timer that have not fired yet (stale ones included)
    pub fn pending_updates(&self) -> usize {
        self.pending.load(AtomicOrdering::Relaxed)
    }
}

impl Drop for VisualSync {
    fn drop(&mut self) {
        let _ = self.timer_tx.send(TimerCommand::Shutdown);
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            error!("Visual sync timer thread panicked");
        }
    }
}

fn run_timer(commands: Receiver<TimerCommand>, display: SharedDisplay, pending: Arc<AtomicUsize>) {
    let mut queue: BinaryHeap<Reverse<PendingUpdate>> = BinaryHeap::new();

    loop {
        let received = match queue.peek() {
            Some(Reverse(next)) => {
                let timeout = next.deadline.saturating_duration_since(Instant::now());
                match commands.recv_timeout(timeout) {
                    Ok(command) => Some(command),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            None => match commands.recv() {
                Ok(command) => Some(command),
                Err(_) => break,
            },
        };

        match received {
            Some(TimerCommand::Schedule(update)) => queue.push(Reverse(update)),
            Some(TimerCommand::Shutdown) => break,
            None => {}
        }

        let now = Instant::now();
        while queue
            .peek()
            .is_some_and(|Reverse(next)| next.deadline <= now)
        {
            if let Some(Reverse(due)) = queue.pop() {
                display.apply(due.generation, due.update);
                pending.fetch_sub(1, AtomicOrdering::Relaxed);
            }
        }
    }
}
