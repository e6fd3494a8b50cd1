//! Position sources: where fixes come from.
//!
//! A source posts `AppEvent::Fix` and `AppEvent::SourceFailed` into the event
//! queue while it is listening. `stop_updates` joins the posting thread, so no
//! notification is sent after it returns.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::{debug, warn};

use crate::fix::{Coordinate, Fix};
use crate::fix_log::FixLogEntry;
use crate::runtime::{AppEvent, EventSender};

const POLL_SLICE: Duration = Duration::from_millis(25);
const METERS_PER_DEGREE: f64 = 111_320.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum Authorization {
    NotDetermined,
    Restricted,
    Denied,
    Authorized,
}

/// Failure notifications a source can deliver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceFailure {
    /// No fix available right now; the source keeps trying
    LocationUnknown,
    Denied,
    Other(String),
}

pub trait PositionSource {
    fn authorization(&self) -> Authorization;
    fn request_authorization(&mut self);
    fn services_enabled(&self) -> bool;
    fn start_updates(&mut self);
    fn stop_updates(&mut self);
}

impl<S: PositionSource + ?Sized> PositionSource for Box<S> {
    fn authorization(&self) -> Authorization {
        (**self).authorization()
    }

    fn request_authorization(&mut self) {
        (**self).request_authorization()
    }

    fn services_enabled(&self) -> bool {
        (**self).services_enabled()
    }

    fn start_updates(&mut self) {
        (**self).start_updates()
    }

    fn stop_updates(&mut self) {
        (**self).stop_updates()
    }
}

/// Something a feed wants posted
#[derive(Debug, Clone, PartialEq)]
pub enum Emission {
    Reading {
        coordinate: Coordinate,
        accuracy: f64,
        /// Backdates the fix timestamp
        age: Duration,
    },
    Failure(SourceFailure),
}

impl Emission {
    fn into_event(self) -> AppEvent {
        match self {
            Emission::Reading {
                coordinate,
                accuracy,
                age,
            } => {
                AppEvent::Fix(Fix {
                    coordinate,
                    horizontal_accuracy: accuracy,
                    timestamp: backdate(Utc::now(), age),
                })
            }
            Emission::Failure(failure) => AppEvent::SourceFailed(failure),
        }
    }
}

/// Ages too large to represent land on the earliest instant, which is always stale
fn backdate(now: DateTime<Utc>, age: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(age)
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// A schedule of emissions. Each call yields the delay since the previous
/// emission and the emission itself, or None when the feed is exhausted.
pub trait Feed: Clone + Send + 'static {
    fn next_emission(&mut self) -> Option<(Duration, Emission)>;
}

/// Background thread posting a feed's emissions while `listening` holds
struct Emitter {
    listening: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Emitter {
    fn spawn<F: Feed>(mut feed: F, tx: EventSender) -> Self {
        let listening = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&listening);

        let handle = thread::spawn(move || {
            while let Some((delay, emission)) = feed.next_emission() {
                if !sleep_while(&flag, delay) {
                    return;
                }
                if tx.send(emission.into_event()).is_err() {
                    return;
                }
            }
            debug!("feed exhausted");
        });

        Self { listening, handle }
    }

    fn stop(self) {
        self.listening.store(false, Ordering::SeqCst);
        if self.handle.join().is_err() {
            warn!("position feed thread panicked");
        }
    }
}

/// Sleeps for `delay` in short slices; false if the flag dropped meanwhile
fn sleep_while(flag: &AtomicBool, delay: Duration) -> bool {
    let until = Instant::now() + delay;
    loop {
        if !flag.load(Ordering::SeqCst) {
            return false;
        }
        let now = Instant::now();
        if now >= until {
            return true;
        }
        thread::sleep(POLL_SLICE.min(until - now));
    }
}

/// A position source driven by a feed. Every `start_updates` replays the feed
/// from the beginning.
pub struct FeedSource<F: Feed> {
    feed: F,
    tx: EventSender,
    authorization: Authorization,
    services_enabled: bool,
    emitter: Option<Emitter>,
}

impl<F: Feed> FeedSource<F> {
    pub fn new(feed: F, tx: EventSender) -> Self {
        Self {
            feed,
            tx,
            authorization: Authorization::Authorized,
            services_enabled: true,
            emitter: None,
        }
    }

    pub fn with_authorization(mut self, authorization: Authorization) -> Self {
        self.authorization = authorization;
        self
    }

    pub fn with_services_enabled(mut self, enabled: bool) -> Self {
        self.services_enabled = enabled;
        self
    }

    pub fn is_listening(&self) -> bool {
        self.emitter.is_some()
    }
}

impl<F: Feed> PositionSource for FeedSource<F> {
    fn authorization(&self) -> Authorization {
        self.authorization
    }

    fn request_authorization(&mut self) {
        if self.authorization == Authorization::NotDetermined {
            self.authorization = Authorization::Authorized;
        }
    }

    fn services_enabled(&self) -> bool {
        self.services_enabled
    }

    fn start_updates(&mut self) {
        self.stop_updates();
        self.emitter = Some(Emitter::spawn(self.feed.clone(), self.tx.clone()));
    }

    fn stop_updates(&mut self) {
        if let Some(emitter) = self.emitter.take() {
            emitter.stop();
        }
    }
}

impl<F: Feed> Drop for FeedSource<F> {
    fn drop(&mut self) {
        self.stop_updates();
    }
}

/// Replays a recorded fix log at its recorded pace
#[derive(Debug, Clone)]
pub struct ReplayFeed {
    entries: Vec<FixLogEntry>,
    next: usize,
}

impl ReplayFeed {
    pub fn new(entries: Vec<FixLogEntry>) -> Self {
        Self { entries, next: 0 }
    }
}

impl Feed for ReplayFeed {
    fn next_emission(&mut self) -> Option<(Duration, Emission)> {
        let entry = self.entries.get(self.next)?.clone();
        let previous = match self.next {
            0 => Duration::ZERO,
            n => self.entries[n - 1].offset(),
        };
        self.next += 1;

        let delay = entry.offset().saturating_sub(previous);
        let emission = match entry {
            FixLogEntry::Reading {
                coordinate,
                accuracy,
                age,
                ..
            } => Emission::Reading {
                coordinate,
                accuracy,
                age,
            },
            FixLogEntry::Failure { failure, .. } => Emission::Failure(failure),
        };
        Some((delay, emission))
    }
}

/// Noisy fixes around an origin, one per interval, with accuracy shrinking
/// towards a floor
#[derive(Debug, Clone)]
pub struct SimulatedFeed {
    origin: Coordinate,
    interval: Duration,
    initial_accuracy: f64,
    floor_accuracy: f64,
    step: u32,
}

impl SimulatedFeed {
    pub fn new(origin: Coordinate) -> Self {
        Self {
            origin,
            interval: Duration::from_secs(1),
            initial_accuracy: 65.0,
            floor_accuracy: 5.0,
            step: 0,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    fn accuracy_at(&self, step: u32) -> f64 {
        (self.initial_accuracy * 0.7_f64.powi(step as i32)).max(self.floor_accuracy)
    }
}

impl Feed for SimulatedFeed {
    fn next_emission(&mut self) -> Option<(Duration, Emission)> {
        let mut rng = rand::thread_rng();
        let nominal = self.accuracy_at(self.step);
        let accuracy = (nominal + rng.gen_range(-0.5..0.5) * nominal * 0.2).max(1.0);

        let north = rng.gen_range(-0.5..0.5) * accuracy;
        let east = rng.gen_range(-0.5..0.5) * accuracy;
        let lat = self.origin.latitude + north / METERS_PER_DEGREE;
        let lon_scale = (METERS_PER_DEGREE * self.origin.latitude.to_radians().cos()).max(1.0);
        let lon = self.origin.longitude + east / lon_scale;

        let delay = if self.step == 0 {
            Duration::ZERO
        } else {
            self.interval
        };
        self.step = self.step.saturating_add(1);

        Some((
            delay,
            Emission::Reading {
                coordinate: Coordinate::new(lat, lon),
                accuracy,
                age: Duration::ZERO,
            },
        ))
    }
}

pub type ReplaySource = FeedSource<ReplayFeed>;
pub type SimulatedSource = FeedSource<SimulatedFeed>;
