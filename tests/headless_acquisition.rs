use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;

use loctag::acquisition::{AcquisitionError, AcquisitionSettings, LocationController, Phase, StopReason};
use loctag::fix::{Coordinate, Fix};
use loctag::fix_log::{self, FixLogEntry};
use loctag::geocode::{GazetteerEntry, GazetteerResolver};
use loctag::placemark::Placemark;
use loctag::position::{ReplayFeed, ReplaySource, SourceFailure};
use loctag::readout::Readout;
use loctag::runtime::{AppEvent, FixedTicker, Runner, TestEventSource};

const ORIGIN: (f64, f64) = (37.33182, -122.03118);

fn reading(offset_ms: u64, accuracy: f64) -> FixLogEntry {
    FixLogEntry::Reading {
        offset: Duration::from_millis(offset_ms),
        coordinate: Coordinate::new(ORIGIN.0, ORIGIN.1),
        accuracy,
        age: Duration::ZERO,
    }
}

fn infinite_loop() -> GazetteerEntry {
    GazetteerEntry {
        latitude: ORIGIN.0,
        longitude: ORIGIN.1,
        placemark: Placemark {
            sub_thoroughfare: Some("1".into()),
            thoroughfare: Some("Infinite Loop".into()),
            locality: Some("Cupertino".into()),
            administrative_area: Some("CA".into()),
            postal_code: Some("95014".into()),
            country: Some("United States".into()),
        },
    }
}

type Controller = LocationController<ReplaySource, GazetteerResolver>;

fn setup(
    entries: Vec<FixLogEntry>,
    settings: AcquisitionSettings,
) -> (Controller, Runner<TestEventSource, FixedTicker>) {
    let (tx, rx) = mpsc::channel();
    let source = ReplaySource::new(ReplayFeed::new(entries), tx.clone());
    let resolver = GazetteerResolver::new(vec![infinite_loop()], tx);
    let controller = LocationController::new(source, resolver, settings);
    let runner = Runner::new(
        TestEventSource::new(rx),
        FixedTicker::new(Duration::from_millis(10)),
    );
    (controller, runner)
}

/// Drives the loop until acquisition and geocoding have both settled
fn run_until_settled(controller: &mut Controller, runner: &Runner<TestEventSource, FixedTicker>) {
    for _ in 0..500u32 {
        let event = runner.step();
        controller.handle(event, Utc::now());
        if !controller.is_acquiring() && !controller.is_geocoding() {
            return;
        }
    }
    panic!("acquisition did not settle, phase {:?}", controller.phase());
}

#[test]
fn headless_fixes_converge_and_resolve_an_address() {
    let (mut controller, runner) = setup(
        vec![reading(0, 50.0), reading(30, 30.0), reading(60, 5.0)],
        AcquisitionSettings::default(),
    );

    controller.start(Utc::now());
    run_until_settled(&mut controller, &runner);

    assert_eq!(controller.phase(), Phase::Stopped(StopReason::Converged));
    assert_eq!(controller.best_fix().unwrap().horizontal_accuracy, 5.0);
    assert_eq!(controller.last_error(), None);
    assert!(!controller.source().is_listening());

    let readout = Readout::from(&controller.snapshot());
    assert_eq!(readout.latitude, "37.33182000");
    assert_eq!(readout.longitude, "-122.03118000");
    assert_eq!(readout.address, "1 Infinite Loop\nCupertino CA 95014");
    assert_eq!(readout.action, "Get My Location");
}

#[test]
fn headless_fix_log_replay() {
    let csv = "offset_secs,latitude,longitude,accuracy,age_secs,kind\n\
               0.0,37.33182,-122.03118,65.0,,\n\
               0.02,,,,,unknown\n\
               0.04,37.33182,-122.03118,8.0,,\n";
    let entries = fix_log::read(csv.as_bytes()).unwrap();
    let (mut controller, runner) = setup(entries, AcquisitionSettings::default());

    controller.start(Utc::now());
    run_until_settled(&mut controller, &runner);

    // an unknown location is transient: acquisition carried on to the next fix
    assert_eq!(controller.phase(), Phase::Stopped(StopReason::Converged));
    assert_eq!(controller.best_fix().unwrap().horizontal_accuracy, 8.0);
}

#[test]
fn headless_stale_replayed_fix_is_ignored() {
    let stale = FixLogEntry::Reading {
        offset: Duration::ZERO,
        coordinate: Coordinate::new(ORIGIN.0, ORIGIN.1),
        accuracy: 3.0,
        age: Duration::from_secs(30),
    };
    let (mut controller, runner) = setup(vec![stale, reading(30, 40.0)], AcquisitionSettings::default());

    controller.start(Utc::now());
    for _ in 0..100u32 {
        controller.handle(runner.step(), Utc::now());
        if controller.best_fix().is_some() {
            break;
        }
    }

    assert_eq!(controller.best_fix().unwrap().horizontal_accuracy, 40.0);
    assert!(controller.is_acquiring());
    controller.stop();
    assert_eq!(controller.phase(), Phase::Stopped(StopReason::User));
}

#[test]
fn headless_deadline_without_fix_times_out() {
    let settings = AcquisitionSettings {
        deadline: chrono::Duration::milliseconds(50),
        ..AcquisitionSettings::default()
    };
    let (mut controller, runner) = setup(vec![], settings);

    controller.start(Utc::now());
    run_until_settled(&mut controller, &runner);

    assert_eq!(controller.phase(), Phase::Stopped(StopReason::TimedOut));
    assert_eq!(controller.last_error(), Some(&AcquisitionError::TimedOut));
    assert_eq!(
        Readout::from(&controller.snapshot()).message,
        "Timed Out Getting Location"
    );
}

#[test]
fn headless_deadline_fires_while_stale_fixes_flood_the_queue() {
    let settings = AcquisitionSettings {
        deadline: chrono::Duration::milliseconds(200),
        ..AcquisitionSettings::default()
    };
    let (tx, rx) = mpsc::channel();
    let source = ReplaySource::new(ReplayFeed::new(vec![]), tx.clone());
    let resolver = GazetteerResolver::new(vec![], tx.clone());
    let mut controller = LocationController::new(source, resolver, settings);
    let runner = Runner::new(
        TestEventSource::new(rx),
        FixedTicker::new(Duration::from_millis(100)),
    );

    // stops once the receiver is dropped at the end of the test
    thread::spawn(move || loop {
        let stale = Fix::new(
            ORIGIN.0,
            ORIGIN.1,
            5.0,
            Utc::now() - chrono::Duration::seconds(30),
        );
        if tx.send(AppEvent::Fix(stale)).is_err() {
            break;
        }
        thread::sleep(Duration::from_millis(5));
    });

    controller.start(Utc::now());
    let started = Instant::now();
    while controller.is_acquiring() && started.elapsed() < Duration::from_secs(3) {
        controller.handle(runner.step(), Utc::now());
    }

    assert_eq!(controller.phase(), Phase::Stopped(StopReason::TimedOut));
    assert_eq!(controller.best_fix(), None);
}

#[test]
fn headless_deadline_with_fix_keeps_listening() {
    let settings = AcquisitionSettings {
        deadline: chrono::Duration::milliseconds(50),
        ..AcquisitionSettings::default()
    };
    let (mut controller, runner) = setup(vec![reading(0, 40.0)], settings);

    let started = Utc::now();
    controller.start(started);
    while Utc::now() - started < chrono::Duration::milliseconds(200) {
        controller.handle(runner.step(), Utc::now());
    }

    assert!(controller.is_acquiring());
    assert_eq!(controller.last_error(), None);
    controller.stop();
}

#[test]
fn headless_denied_source_fails() {
    let denied = FixLogEntry::Failure {
        offset: Duration::from_millis(10),
        failure: SourceFailure::Denied,
    };
    let (mut controller, runner) = setup(vec![denied], AcquisitionSettings::default());

    controller.start(Utc::now());
    run_until_settled(&mut controller, &runner);

    assert_eq!(controller.phase(), Phase::Stopped(StopReason::Failed));
    assert_eq!(
        controller.last_error(),
        Some(&AcquisitionError::PermissionDenied)
    );
    assert_eq!(
        Readout::from(&controller.snapshot()).message,
        "Location Access Denied"
    );
}
