//! Integration tests for the sampling tick: SensorReader → ControlContext
//! → PersistenceService → Broadcaster, including the Degraded policy and
//! backend switches.

use std::sync::Arc;
use std::time::Duration;

use crate::mock_hw::{
    ActuatorCall, FixedClock, FlakyStore, MockSensors, RawValues, RecordingActuators,
    RecordingBroadcaster, RecordingScheduler, comfortable, test_config, water_distance,
};

use mycobox::app::commands::{AppCommand, CommandReply};
use mycobox::app::context::{ControlContext, SharedControl, lock_control};
use mycobox::app::events::LoopEvent;
use mycobox::app::orchestrator::{LoopState, Orchestrator};
use mycobox::control::{ControlEngine, TimerDirective};
use mycobox::model::Status;
use mycobox::persistence::health::HealthMonitor;
use mycobox::persistence::{Backend, PersistenceService};
use mycobox::sensors::{SensorMode, SensorReader};

type TestLoop = Orchestrator<RecordingActuators, RecordingBroadcaster, RecordingScheduler>;

struct Rig {
    orch: TestLoop,
    control: SharedControl<RecordingActuators>,
    sensors: MockSensors,
    primary: FlakyStore,
    fallback: FlakyStore,
    scheduler: RecordingScheduler,
    clock: FixedClock,
}

fn rig_with(values: RawValues, actuators: RecordingActuators) -> Rig {
    let config = test_config();
    let clock = FixedClock::new();
    let sensors = MockSensors::new(values);
    let primary = FlakyStore::new("primary");
    let fallback = FlakyStore::new("fallback");
    let scheduler = RecordingScheduler::new();

    let persistence = Arc::new(PersistenceService::new(
        config.device_id.clone(),
        Some(Box::new(primary.clone())),
        Box::new(fallback.clone()),
        Arc::new(clock.clone()),
    ));
    let control = ControlContext::new(
        config.phases.clone(),
        config.initial_phase,
        ControlEngine::new(config.control, config.light_schedule),
        actuators,
    )
    .unwrap()
    .into_shared();
    let orch = Orchestrator::new(
        &config,
        SensorReader::hardware(&config, Box::new(sensors.clone())),
        Arc::clone(&control),
        persistence,
        RecordingBroadcaster::new(),
        scheduler.clone(),
        Arc::new(clock.clone()),
    );

    Rig {
        orch,
        control,
        sensors,
        primary,
        fallback,
        scheduler,
        clock,
    }
}

fn rig() -> Rig {
    rig_with(comfortable(), RecordingActuators::new())
}

// ── Clean ticks ───────────────────────────────────────────────

#[test]
fn started_event_announces_mode_and_backend() {
    let mut r = rig();
    r.orch.start();
    assert!(matches!(
        r.orch.broadcaster().events[0],
        LoopEvent::Started {
            mode: SensorMode::Hardware,
            backend: Backend::Primary
        }
    ));
}

#[test]
fn healthy_tick_reads_decides_saves_and_publishes() {
    let mut r = rig();

    let wait = r.orch.run_once();

    assert_eq!(wait, Duration::from_secs(10), "clean tick waits the full interval");
    assert_eq!(*r.orch.state(), LoopState::Running);

    let rows = r.primary.rows();
    assert_eq!(rows.len(), 1);
    let saved = &rows[0];
    assert_eq!(saved.device_id, "chamber-test");
    assert_eq!(saved.status, Status::Optimal);
    assert_eq!(saved.light_intensity, Some(500));
    assert!(saved.server_timestamp.is_some());
    assert!(r.fallback.rows().is_empty());

    // Hour 12 is inside the default 08–20 schedule and fruiting needs light.
    let ctx = lock_control(&r.control).unwrap();
    assert_eq!(ctx.driver().calls, vec![ActuatorCall::Lights(true)]);
    drop(ctx);

    assert_eq!(r.orch.broadcaster().updates(), 1);
    let current = r.orch.current().expect("snapshot after tick");
    assert!(current.actuators.lights_active);
    assert_eq!(current.backend.backend, Backend::Primary);
}

#[test]
fn lights_follow_the_schedule() {
    let mut r = rig();
    r.orch.tick().unwrap();
    r.clock.set_hour(21);
    r.clock.advance(10);
    let report = r.orch.tick().unwrap();
    assert!(!report.actuators.lights_active);

    let ctx = lock_control(&r.control).unwrap();
    assert_eq!(
        ctx.driver().calls,
        vec![ActuatorCall::Lights(true), ActuatorCall::Lights(false)]
    );
}

#[test]
fn low_humidity_starts_fogger_and_arms_auto_off() {
    let mut r = rig();
    r.sensors.update(|v| v.humidity = Some(50.0));

    let report = r.orch.tick().unwrap();

    assert!(report.actuators.fogger_active);
    assert_eq!(report.reading.status, Status::Good);
    assert!(matches!(
        r.scheduler.directives().as_slice(),
        [TimerDirective::Arm(_)]
    ));
    assert_eq!(
        lock_control(&r.control).unwrap().driver().fogger_calls(),
        vec![true]
    );
}

#[test]
fn low_water_forces_fogger_off_and_cancels_auto_off() {
    let mut r = rig();
    r.sensors.update(|v| v.humidity = Some(50.0));
    r.orch.tick().unwrap();

    r.sensors.update(|v| v.water_distance = Some(water_distance(10.0)));
    r.clock.advance(10);
    let report = r.orch.tick().unwrap();

    assert!(!report.actuators.fogger_active);
    assert_eq!(
        r.scheduler.directives().last(),
        Some(&TimerDirective::Cancel)
    );
    assert_eq!(
        lock_control(&r.control).unwrap().driver().fogger_calls(),
        vec![true, false]
    );
}

#[test]
fn missing_water_history_keeps_fogger_off() {
    let mut r = rig();
    r.sensors.update(|v| {
        v.humidity = Some(50.0);
        v.water_distance = None;
    });

    let report = r.orch.tick().unwrap();

    assert_eq!(report.reading.water_level, Some(0.0));
    assert_eq!(report.reading.status, Status::Critical);
    assert!(!report.actuators.fogger_active);
    assert!(r.scheduler.directives().is_empty());
}

#[test]
fn failed_sensor_fields_reuse_last_values() {
    let mut r = rig();
    r.orch.tick().unwrap();

    r.sensors.update(|v| {
        v.humidity = None;
        v.temperature = Some(f32::NAN);
    });
    r.clock.advance(10);
    let report = r.orch.tick().unwrap();

    assert_eq!(report.reading.humidity, 75.0);
    assert_eq!(report.reading.temperature, 23.0);
    assert_eq!(r.primary.rows().len(), 2);
}

#[test]
fn actuator_failure_does_not_degrade_the_loop() {
    let actuators = RecordingActuators {
        fail_fogger: true,
        ..RecordingActuators::default()
    };
    let mut r = rig_with(comfortable(), actuators);
    r.sensors.update(|v| v.humidity = Some(50.0));

    let wait = r.orch.run_once();

    assert_eq!(wait, Duration::from_secs(10));
    assert_eq!(*r.orch.state(), LoopState::Running);
    let current = r.orch.current().unwrap();
    assert!(!current.actuators.fogger_active);
    assert_eq!(r.primary.rows().len(), 1);
}

// ── Failure policy ────────────────────────────────────────────

#[test]
fn both_backends_down_degrades_then_recovers_in_sampling_order() {
    let mut r = rig();
    r.primary.set_up(false);
    r.fallback.set_up(false);

    let wait = r.orch.run_once();
    assert_eq!(wait, Duration::from_secs(5), "degraded waits the backoff");
    assert!(matches!(r.orch.state(), LoopState::Degraded { .. }));
    assert_eq!(r.orch.backlog_len(), 1);

    r.clock.advance(5);
    assert_eq!(r.orch.run_once(), Duration::from_secs(5));
    assert_eq!(r.orch.backlog_len(), 2);

    r.fallback.set_up(true);
    r.clock.advance(5);
    assert_eq!(r.orch.run_once(), Duration::from_secs(10));
    assert_eq!(*r.orch.state(), LoopState::Running);
    assert_eq!(r.orch.backlog_len(), 0);

    let rows = r.fallback.rows();
    assert_eq!(rows.len(), 3);
    assert!(
        rows.windows(2).all(|w| w[0].timestamp < w[1].timestamp),
        "stored in sampling order"
    );

    let events = &r.orch.broadcaster().events;
    let degraded = r
        .orch
        .broadcaster()
        .count(|e| matches!(e, LoopEvent::Degraded { .. }));
    assert_eq!(degraded, 2);
    assert!(matches!(events.last(), Some(LoopEvent::Recovered)));
    assert_eq!(r.orch.broadcaster().updates(), 1);
}

#[test]
fn primary_outage_switches_backend_and_health_probe_restores_it() {
    let mut r = rig();
    let monitor = HealthMonitor::new(Arc::clone(r.orch.persistence()), Duration::from_secs(30));

    r.orch.run_once();
    assert_eq!(r.primary.rows().len(), 1);

    r.primary.set_up(false);
    r.clock.advance(10);
    assert_eq!(r.orch.run_once(), Duration::from_secs(10), "failover is not a failure");
    assert_eq!(r.fallback.rows().len(), 1);
    assert!(r.orch.broadcaster().events.iter().any(|e| matches!(
        e,
        LoopEvent::BackendChanged {
            from: Backend::Primary,
            to: Backend::Fallback
        }
    )));

    assert!(!monitor.probe(), "primary still down");

    r.primary.set_up(true);
    assert!(monitor.probe());
    r.clock.advance(10);
    r.orch.run_once();

    assert_eq!(r.primary.rows().len(), 2);
    assert!(matches!(
        r.orch.broadcaster().events.last(),
        Some(LoopEvent::BackendChanged {
            from: Backend::Fallback,
            to: Backend::Primary
        })
    ));
}

// ── Operator handle ───────────────────────────────────────────

#[test]
fn snapshot_handle_sees_last_tick() {
    let mut r = rig();
    let handle = r.orch.handle();

    assert_eq!(
        handle.execute(AppCommand::RequestSnapshot).unwrap(),
        CommandReply::Snapshot(None)
    );

    let report = r.orch.tick().unwrap();
    match handle.execute(AppCommand::RequestSnapshot).unwrap() {
        CommandReply::Snapshot(Some(update)) => {
            assert_eq!(update.reading, report.reading);
            assert_eq!(update.actuators, report.actuators);
        }
        other => panic!("unexpected reply {other:?}"),
    }
}
