//! Location fix acquisition.
//!
//! `LocationController` turns the noisy stream of fixes coming out of a
//! `PositionSource` into one good-enough location plus an address, and bounds
//! how long that takes. Every handler runs on the event loop thread and
//! returns without blocking; the position source and the address resolver
//! answer later through the event queue.

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{debug, info};

use crate::fix::Fix;
use crate::geocode::{AddressResolver, GeocodeError, GeocodeRequest, GeocodeTicket};
use crate::placemark::Placemark;
use crate::position::{Authorization, PositionSource, SourceFailure};
use crate::runtime::AppEvent;

pub const DEFAULT_DESIRED_ACCURACY_M: f64 = 10.0;
pub const STALE_FIX_SECS: i64 = 5;
pub const DEADLINE_SECS: i64 = 60;
pub const STAGNATION_RADIUS_M: f64 = 1.0;
pub const STAGNATION_SECS: i64 = 10;

/// Why there is no location. Recorded as state and rendered by the readout,
/// never returned from a handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AcquisitionError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("location services disabled")]
    ServiceDisabled,
    #[error("location acquisition failed: {0}")]
    Failed(String),
    #[error("timed out without a location fix")]
    TimedOut,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionSettings {
    /// Converged once the best fix is at least this accurate (meters)
    pub desired_accuracy: f64,
    /// Fixes older than this are cached leftovers
    pub stale_after: Duration,
    /// Give up when no fix was accepted by then
    pub deadline: Duration,
    /// Movement below this counts as standing still (meters)
    pub stagnation_radius: f64,
    pub stagnation_window: Duration,
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            desired_accuracy: DEFAULT_DESIRED_ACCURACY_M,
            stale_after: Duration::seconds(STALE_FIX_SECS),
            deadline: Duration::seconds(DEADLINE_SECS),
            stagnation_radius: STAGNATION_RADIUS_M,
            stagnation_window: Duration::seconds(STAGNATION_SECS),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum StopReason {
    Converged,
    Stagnated,
    TimedOut,
    Failed,
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Acquiring,
    Stopped(StopReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// Access was undetermined; the source was asked and the user must start again
    AuthorizationRequested,
    PermissionDenied,
    ServiceDisabled,
    /// `get_location` while acquiring stops instead
    Stopped,
}

/// What became of one reported fix
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FixDisposition {
    NotListening,
    Stale,
    InvalidAccuracy,
    Accepted { improved: bool },
}

/// One-shot deadline. It lives inside the session, so every exit from
/// Acquiring drops it.
#[derive(Debug)]
struct Deadline {
    fires_at: DateTime<Utc>,
}

impl Deadline {
    fn arm(now: DateTime<Utc>, after: Duration) -> Self {
        Self {
            fires_at: now + after,
        }
    }

    fn is_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.fires_at
    }
}

#[derive(Debug)]
struct Session {
    id: u64,
    /// None once fired
    deadline: Option<Deadline>,
}

#[derive(Debug)]
enum State {
    Idle,
    Acquiring(Session),
    Stopped(StopReason),
}

/// Results of the latest session. Reset on start, kept after stop so the
/// presentation can keep showing them.
#[derive(Debug, Clone, Default)]
struct Findings {
    best_fix: Option<Fix>,
    last_error: Option<AcquisitionError>,
    placemark: Option<Placemark>,
    geocode_error: Option<GeocodeError>,
    geocoding: bool,
}

/// Read-only view handed to the presentation layer
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub phase: Phase,
    pub best_fix: Option<Fix>,
    pub placemark: Option<Placemark>,
    pub geocoding: bool,
    pub geocode_error: Option<GeocodeError>,
    pub last_error: Option<AcquisitionError>,
    pub services_enabled: bool,
}

impl Snapshot {
    pub fn is_acquiring(&self) -> bool {
        self.phase == Phase::Acquiring
    }
}

pub struct LocationController<P: PositionSource, R: AddressResolver> {
    source: P,
    resolver: R,
    settings: AcquisitionSettings,
    state: State,
    findings: Findings,
    sessions: u64,
    geocodes: u64,
}

impl<P: PositionSource, R: AddressResolver> LocationController<P, R> {
    pub fn new(source: P, resolver: R, settings: AcquisitionSettings) -> Self {
        Self {
            source,
            resolver,
            settings,
            state: State::Idle,
            findings: Findings::default(),
            sessions: 0,
            geocodes: 0,
        }
    }

    /// The "Get My Location" / "Stop" action
    pub fn get_location(&mut self, now: DateTime<Utc>) -> StartOutcome {
        if self.is_acquiring() {
            self.stop();
            return StartOutcome::Stopped;
        }
        self.start(now)
    }

    /// Starts a fresh session, tearing down any running one
    pub fn start(&mut self, now: DateTime<Utc>) -> StartOutcome {
        match self.source.authorization() {
            Authorization::NotDetermined => {
                info!("requesting location authorization");
                self.source.request_authorization();
                return StartOutcome::AuthorizationRequested;
            }
            Authorization::Denied | Authorization::Restricted => {
                info!("location access denied");
                self.findings.last_error = Some(AcquisitionError::PermissionDenied);
                return StartOutcome::PermissionDenied;
            }
            Authorization::Authorized => {}
        }

        if self.is_acquiring() {
            self.source.stop_updates();
        }
        self.state = State::Idle;
        self.findings = Findings::default();
        self.sessions += 1;

        if !self.source.services_enabled() {
            info!("location services disabled");
            self.findings.last_error = Some(AcquisitionError::ServiceDisabled);
            return StartOutcome::ServiceDisabled;
        }

        self.source.start_updates();
        self.state = State::Acquiring(Session {
            id: self.sessions,
            deadline: Some(Deadline::arm(now, self.settings.deadline)),
        });
        info!(session = self.sessions, "acquisition started");
        StartOutcome::Started
    }

    /// User stop. Calling it when not acquiring does nothing.
    pub fn stop(&mut self) {
        self.stop_with(StopReason::User);
    }

    fn stop_with(&mut self, reason: StopReason) -> bool {
        if !self.is_acquiring() {
            return false;
        }
        self.source.stop_updates();
        // drops the session and with it the deadline
        self.state = State::Stopped(reason);
        info!(%reason, "acquisition stopped");
        true
    }

    pub fn on_fix(&mut self, fix: Fix, now: DateTime<Utc>) -> FixDisposition {
        let session = match &self.state {
            State::Acquiring(session) => session.id,
            _ => return FixDisposition::NotListening,
        };

        if fix.age(now) > self.settings.stale_after {
            debug!(age = %fix.age(now), "ignoring stale fix");
            return FixDisposition::Stale;
        }
        if !fix.has_valid_accuracy() {
            debug!(accuracy = fix.horizontal_accuracy, "ignoring invalid fix");
            return FixDisposition::InvalidAccuracy;
        }

        let distance = self
            .findings
            .best_fix
            .as_ref()
            .map_or(f64::MAX, |best| fix.distance_to(best));

        let improved = self
            .findings
            .best_fix
            .as_ref()
            .map_or(true, |best| fix.is_more_accurate_than(best));
        if improved {
            debug!(accuracy = fix.horizontal_accuracy, "new best fix");
            self.findings.last_error = None;
            self.findings.best_fix = Some(fix);
        }

        let best = self.findings.best_fix.unwrap_or(fix);

        if best.horizontal_accuracy <= self.settings.desired_accuracy {
            self.stop_with(StopReason::Converged);
            if distance > 0.0 {
                // moved: the lookup in flight is for an outdated position
                self.findings.geocoding = false;
            }
        }

        if !self.findings.geocoding {
            self.begin_geocode(session, fix);
        } else if distance < self.settings.stagnation_radius
            && fix.timestamp - best.timestamp > self.settings.stagnation_window
        {
            info!("position stable but accuracy stuck, forcing stop");
            self.stop_with(StopReason::Stagnated);
        }

        FixDisposition::Accepted { improved }
    }

    fn begin_geocode(&mut self, session: u64, fix: Fix) {
        self.geocodes += 1;
        let ticket = GeocodeTicket {
            session,
            serial: self.geocodes,
        };
        debug!(?ticket, "reverse geocoding");
        self.findings.geocoding = true;
        self.resolver.reverse_geocode(GeocodeRequest { ticket, fix });
    }

    pub fn on_source_failure(&mut self, failure: SourceFailure) {
        if !self.is_acquiring() {
            return;
        }
        let error = match failure {
            SourceFailure::LocationUnknown => {
                debug!("location unknown for now, still listening");
                return;
            }
            SourceFailure::Denied => AcquisitionError::PermissionDenied,
            SourceFailure::Other(reason) => AcquisitionError::Failed(reason),
        };
        info!(%error, "position source failed");
        self.findings.last_error = Some(error);
        self.stop_with(StopReason::Failed);
    }

    /// Fires the deadline once it is due
    pub fn on_tick(&mut self, now: DateTime<Utc>) {
        let fired = match &mut self.state {
            State::Acquiring(session) => match &session.deadline {
                Some(deadline) if deadline.is_due(now) => {
                    session.deadline = None;
                    true
                }
                _ => false,
            },
            _ => false,
        };
        if !fired {
            return;
        }

        info!("acquisition deadline reached");
        if self.findings.best_fix.is_none() {
            self.stop_with(StopReason::TimedOut);
            self.findings.last_error = Some(AcquisitionError::TimedOut);
        }
    }

    pub fn on_geocode_completed(
        &mut self,
        ticket: GeocodeTicket,
        result: Result<Vec<Placemark>, GeocodeError>,
    ) {
        if ticket.session != self.sessions {
            debug!(?ticket, "discarding geocode result from an earlier session");
            return;
        }

        self.findings.geocoding = false;
        match result.and_then(|mut found| found.pop().ok_or(GeocodeError::NoResults)) {
            Ok(placemark) => {
                debug!(?ticket, "address resolved");
                self.findings.placemark = Some(placemark);
                self.findings.geocode_error = None;
            }
            Err(error) => {
                debug!(?ticket, %error, "no address");
                self.findings.placemark = None;
                self.findings.geocode_error = Some(error);
            }
        }
    }

    /// Routes the location-related events; returns false for the rest
    pub fn handle(&mut self, event: AppEvent, now: DateTime<Utc>) -> bool {
        match event {
            AppEvent::Fix(fix) => {
                self.on_fix(fix, now);
            }
            AppEvent::SourceFailed(failure) => self.on_source_failure(failure),
            AppEvent::GeocodeCompleted { ticket, result } => {
                self.on_geocode_completed(ticket, result)
            }
            AppEvent::Tick => self.on_tick(now),
            AppEvent::Key(_) | AppEvent::Resize => return false,
        }
        true
    }

    pub fn phase(&self) -> Phase {
        match &self.state {
            State::Idle => Phase::Idle,
            State::Acquiring(_) => Phase::Acquiring,
            State::Stopped(reason) => Phase::Stopped(*reason),
        }
    }

    pub fn is_acquiring(&self) -> bool {
        matches!(self.state, State::Acquiring(_))
    }

    pub fn is_geocoding(&self) -> bool {
        self.findings.geocoding
    }

    pub fn best_fix(&self) -> Option<&Fix> {
        self.findings.best_fix.as_ref()
    }

    pub fn placemark(&self) -> Option<&Placemark> {
        self.findings.placemark.as_ref()
    }

    pub fn last_error(&self) -> Option<&AcquisitionError> {
        self.findings.last_error.as_ref()
    }

    pub fn settings(&self) -> &AcquisitionSettings {
        &self.settings
    }

    pub fn source(&self) -> &P {
        &self.source
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    pub fn resolver_mut(&mut self) -> &mut R {
        &mut self.resolver
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            phase: self.phase(),
            best_fix: self.findings.best_fix,
            placemark: self.findings.placemark.clone(),
            geocoding: self.findings.geocoding,
            geocode_error: self.findings.geocode_error.clone(),
            last_error: self.findings.last_error.clone(),
            services_enabled: self.source.services_enabled(),
        }
    }
}
