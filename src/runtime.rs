use std::cell::Cell;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use crossterm::event::{self, Event as CtEvent, KeyEvent};

use crate::fix::Fix;
use crate::geocode::{GeocodeError, GeocodeTicket};
use crate::placemark::Placemark;
use crate::position::SourceFailure;

/// Unified event type consumed by the app runner. Terminal input, position
/// updates and geocoder completions all arrive through one queue so the
/// controller only ever sees them one at a time.
#[derive(Clone, Debug)]
pub enum AppEvent {
    Key(KeyEvent),
    Resize,
    Tick,
    Fix(Fix),
    SourceFailed(SourceFailure),
    GeocodeCompleted {
        ticket: GeocodeTicket,
        result: Result<Vec<Placemark>, GeocodeError>,
    },
}

/// Producers (position sources, resolvers) post into the queue through this
pub type EventSender = Sender<AppEvent>;

/// Source of application events
pub trait AppEventSource: Send + 'static {
    /// Waits at most `timeout` for the next queued event
    fn recv_timeout(&self, timeout: Duration) -> Result<AppEvent, RecvTimeoutError>;
}

/// Production event source: crossterm input plus whatever the returned
/// sender's clones post
pub struct TerminalEventSource {
    rx: Receiver<AppEvent>,
    tx: EventSender,
}

impl TerminalEventSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        let input_tx = tx.clone();

        std::thread::spawn(move || loop {
            let sent = match event::read() {
                Ok(CtEvent::Key(key)) => input_tx.send(AppEvent::Key(key)),
                Ok(CtEvent::Resize(_, _)) => input_tx.send(AppEvent::Resize),
                Ok(_) => Ok(()),
                Err(_) => break,
            };
            if sent.is_err() {
                break;
            }
        });

        Self { rx, tx }
    }

    pub fn sender(&self) -> EventSender {
        self.tx.clone()
    }
}

impl Default for TerminalEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl AppEventSource for TerminalEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<AppEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// How often `Runner` emits `Tick`; this paces deadline checks
pub trait Ticker: Send + Sync + 'static {
    fn interval(&self) -> Duration;
}

#[derive(Clone, Copy, Debug)]
pub struct FixedTicker {
    interval: Duration,
}

impl FixedTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Ticker for FixedTicker {
    fn interval(&self) -> Duration {
        self.interval
    }
}

/// Channel-backed event source for tests and headless use
pub struct TestEventSource {
    rx: Receiver<AppEvent>,
}

impl TestEventSource {
    pub fn new(rx: Receiver<AppEvent>) -> Self {
        Self { rx }
    }
}

impl AppEventSource for TestEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<AppEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Pulls one event per call, so handlers never overlap
pub struct Runner<E: AppEventSource, T: Ticker> {
    event_source: E,
    ticker: T,
    next_tick: Cell<Instant>,
}

impl<E: AppEventSource, T: Ticker> Runner<E, T> {
    pub fn new(event_source: E, ticker: T) -> Self {
        let next_tick = Cell::new(Instant::now() + ticker.interval());
        Self {
            event_source,
            ticker,
            next_tick,
        }
    }

    /// Next queued event, or `Tick` whenever one is due. A busy queue never
    /// holds a tick back for longer than one interval.
    pub fn step(&self) -> AppEvent {
        let now = Instant::now();
        let due = self.next_tick.get();
        if now >= due {
            return self.tick(now);
        }
        match self.event_source.recv_timeout(due - now) {
            Ok(ev) => ev,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                self.tick(Instant::now())
            }
        }
    }

    fn tick(&self, now: Instant) -> AppEvent {
        self.next_tick.set(now + self.ticker.interval());
        AppEvent::Tick
    }
}
