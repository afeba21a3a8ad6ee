//! Integration tests for operator commands and the fogger auto-off
//! contract through ControlHandle / ControlContext.

use std::time::{Duration, Instant};

use crate::mock_hw::{ActuatorCall, FixedClock, RecordingActuators, RecordingScheduler, reading_at};

use mycobox::app::commands::{AppCommand, CommandReply};
use mycobox::app::context::{ControlContext, ControlHandle, SharedControl, SnapshotCache, lock_control};
use mycobox::config::{ControlThresholds, LightSchedule, PhaseTable};
use mycobox::control::{ControlEngine, TimerDirective};
use mycobox::error::{ConfigError, Error};
use mycobox::model::{ActuatorState, GrowthPhase};

fn shared(phases: PhaseTable) -> SharedControl<RecordingActuators> {
    ControlContext::new(
        phases,
        GrowthPhase::Fruiting,
        ControlEngine::new(ControlThresholds::default(), LightSchedule::default()),
        RecordingActuators::new(),
    )
    .unwrap()
    .into_shared()
}

fn handle(
    control: &SharedControl<RecordingActuators>,
    scheduler: &RecordingScheduler,
) -> ControlHandle<RecordingActuators, RecordingScheduler> {
    ControlHandle::new(control.clone(), scheduler.clone(), SnapshotCache::default())
}

fn fogger_reply(reply: CommandReply) -> bool {
    match reply {
        CommandReply::Actuators(state) => state.fogger_active,
        other => panic!("unexpected reply {other:?}"),
    }
}

// ── Phase switching ───────────────────────────────────────────

#[test]
fn unconfigured_phase_is_rejected_and_nothing_changes() {
    let fruiting_only = PhaseTable::new(
        PhaseTable::default()
            .iter()
            .filter(|(phase, _)| *phase == GrowthPhase::Fruiting)
            .map(|(phase, cfg)| (phase, cfg.clone()))
            .collect::<Vec<_>>(),
    );
    let control = shared(fruiting_only);
    let h = handle(&control, &RecordingScheduler::new());

    let err = h.execute(AppCommand::SetPhase(GrowthPhase::Pinning)).unwrap_err();
    assert_eq!(
        err,
        Error::Config(ConfigError::UnknownPhase("pinning".into()))
    );
    assert_eq!(lock_control(&control).unwrap().phase(), GrowthPhase::Fruiting);
}

#[test]
fn phase_switch_changes_targets_for_the_next_decision() {
    let clock = FixedClock::new();
    let control = shared(PhaseTable::default());
    let h = handle(&control, &RecordingScheduler::new());

    // 70 % is fine for fruiting (65–85) ...
    let outcome = lock_control(&control)
        .unwrap()
        .step(&reading_at(&clock, 70.0), 12, Instant::now())
        .unwrap();
    assert!(!outcome.actuators.fogger_active);

    // ... but well under pinning's 80 % floor.
    assert_eq!(
        h.execute(AppCommand::SetPhase(GrowthPhase::Pinning)).unwrap(),
        CommandReply::PhaseChanged(GrowthPhase::Pinning)
    );
    let mut pinning = reading_at(&clock, 70.0);
    pinning.growth_phase = GrowthPhase::Pinning;
    let outcome = lock_control(&control)
        .unwrap()
        .step(&pinning, 12, Instant::now())
        .unwrap();
    assert!(outcome.actuators.fogger_active);
}

// ── Fogger pulse / auto-off ───────────────────────────────────

#[test]
fn pulse_refused_when_last_water_reading_is_low() {
    let clock = FixedClock::new();
    let control = shared(PhaseTable::default());
    let scheduler = RecordingScheduler::new();
    let h = handle(&control, &scheduler);

    let mut low = reading_at(&clock, 75.0);
    low.water_level = Some(18.0);
    lock_control(&control)
        .unwrap()
        .step(&low, 12, Instant::now())
        .unwrap();

    let on = fogger_reply(h.execute(AppCommand::PulseFogger(Duration::from_secs(30))).unwrap());
    assert!(!on);
    assert!(scheduler.directives().is_empty());
}

#[test]
fn repeated_pulses_keep_the_original_deadline() {
    let control = shared(PhaseTable::default());
    let scheduler = RecordingScheduler::new();
    let h = handle(&control, &scheduler);

    assert!(fogger_reply(
        h.execute(AppCommand::PulseFogger(Duration::from_secs(30))).unwrap()
    ));
    let first = lock_control(&control).unwrap().pending_auto_off().unwrap();

    for _ in 0..3 {
        assert!(fogger_reply(
            h.execute(AppCommand::PulseFogger(Duration::from_secs(30))).unwrap()
        ));
    }

    assert_eq!(scheduler.directives(), vec![TimerDirective::Arm(first)]);
    assert_eq!(lock_control(&control).unwrap().pending_auto_off(), Some(first));
    assert_eq!(
        lock_control(&control).unwrap().driver().fogger_calls(),
        vec![true],
        "one fogger-on write"
    );
}

#[test]
fn expiry_turns_fogger_off_exactly_once_and_ignores_stale_tokens() {
    let control = shared(PhaseTable::default());
    let scheduler = RecordingScheduler::new();
    let h = handle(&control, &scheduler);

    h.execute(AppCommand::PulseFogger(Duration::from_secs(30))).unwrap();
    let first = lock_control(&control).unwrap().pending_auto_off().unwrap();

    let outcome = lock_control(&control).unwrap().expire_auto_off(first.token);
    assert!(!outcome.actuators.fogger_active);

    // Firing the same deadline again does nothing.
    let outcome = lock_control(&control).unwrap().expire_auto_off(first.token);
    assert!(outcome.commands.is_empty());

    // A new pulse gets a new token; the old one cannot cut it short.
    h.execute(AppCommand::PulseFogger(Duration::from_secs(30))).unwrap();
    let second = lock_control(&control).unwrap().pending_auto_off().unwrap();
    assert_ne!(first.token, second.token);

    let outcome = lock_control(&control).unwrap().expire_auto_off(first.token);
    assert!(outcome.actuators.fogger_active);

    assert_eq!(
        lock_control(&control).unwrap().driver().fogger_calls(),
        vec![true, false, true]
    );
}

#[test]
fn fail_safe_switches_everything_off_and_forgets_the_deadline() {
    let clock = FixedClock::new();
    let control = shared(PhaseTable::default());
    let h = handle(&control, &RecordingScheduler::new());

    lock_control(&control)
        .unwrap()
        .step(&reading_at(&clock, 95.0), 12, Instant::now())
        .unwrap();
    h.execute(AppCommand::PulseFogger(Duration::from_secs(30))).unwrap();

    let mut ctx = lock_control(&control).unwrap();
    ctx.fail_safe().unwrap();

    assert_eq!(ctx.actuators(), ActuatorState::ALL_OFF);
    assert!(ctx.pending_auto_off().is_none());
    let calls = &ctx.driver().calls;
    assert_eq!(
        &calls[calls.len() - 3..],
        &[
            ActuatorCall::Fogger(false),
            ActuatorCall::Fan(0),
            ActuatorCall::Lights(false)
        ]
    );
}
