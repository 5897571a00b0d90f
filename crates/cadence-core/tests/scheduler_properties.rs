//! End-to-end scheduling properties of the simulation loop.
//!
//! These exercise the public API only: a stub stepper, closures capturing
//! shared counters, and the loop running to its termination condition.

// Integration tests use unwrap extensively for clarity -- panicking on
// failure is the correct behavior in test code.
#![allow(clippy::unwrap_used, clippy::panic, clippy::float_cmp)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use cadence_core::clock::Clock;
use cadence_core::collaborator::RecordingStepper;
use cadence_core::operator::{StopHandle, Termination};
use cadence_core::phase::{PhaseController, PhaseSpec};
use cadence_core::runner::{SimulationLoop, StepObserver, StepReport};
use cadence_types::RunEndReason;

fn counter() -> (Rc<Cell<u64>>, impl FnMut() -> anyhow::Result<()> + 'static) {
    let count = Rc::new(Cell::new(0_u64));
    let inner = Rc::clone(&count);
    (count, move || {
        inner.set(inner.get() + 1);
        Ok(())
    })
}

// =============================================================================
// End-to-end cadence
// =============================================================================

#[test]
fn hundred_hz_task_over_one_second_fires_hundred_times() {
    let clock = Clock::new(0.01).unwrap();
    let mut sim = SimulationLoop::new(clock, RecordingStepper::new())
        .with_termination(Termination::at(1.0).unwrap());
    let (count, action) = counter();
    let id = sim.tasks_mut().register(100.0, action).unwrap();

    let result = sim.run_to_end().unwrap();

    assert_eq!(count.get(), 100);
    assert_eq!(sim.tasks().counter(id), Some(100));
    assert_eq!(result.total_steps, 100);
    assert_eq!(result.end_reason, RunEndReason::EndTimeReached);
    assert!((result.final_elapsed - 1.0).abs() < 1e-9);
}

#[test]
fn output_and_render_cadences_are_independent() {
    // The robot demo: 1 ms physics, 100 Hz data output, 60 Hz frames.
    let clock = Clock::new(1e-3).unwrap();
    let mut sim = SimulationLoop::new(clock, RecordingStepper::new())
        .with_termination(Termination::new().with_max_steps(1_000));
    let (outputs, output_action) = counter();
    let (frames, frame_action) = counter();
    let output_id = sim.tasks_mut().register_named("data", 100.0, output_action).unwrap();
    let frame_id = sim.tasks_mut().register_named("frames", 60.0, frame_action).unwrap();

    let _ = sim.run_to_end().unwrap();

    assert_eq!(sim.tasks().step_interval(output_id), Some(10));
    assert_eq!(sim.tasks().step_interval(frame_id), Some(17));
    assert_eq!(outputs.get(), 100);
    // Steps 17, 34, ..., 986.
    assert_eq!(frames.get(), 58);
}

// =============================================================================
// Timed events
// =============================================================================

#[test]
fn terrain_event_fires_once_when_robot_has_settled() {
    let clock = Clock::new(0.1).unwrap();
    let mut sim = SimulationLoop::new(clock, RecordingStepper::new())
        .with_termination(Termination::at(3.0).unwrap());
    let fired_at: Rc<RefCell<Vec<u64>>> = Rc::default();
    let fired_in = Rc::clone(&fired_at);
    let steps_seen = Rc::new(Cell::new(0_u64));
    let steps_in = Rc::clone(&steps_seen);
    let _ = sim.tasks_mut().register(10.0, move || {
        steps_in.set(steps_in.get() + 1);
        Ok(())
    });
    let steps_for_event = Rc::clone(&steps_seen);
    let id = sim
        .events_mut()
        .schedule_named("create_terrain", 1.0, move || {
            fired_in.borrow_mut().push(steps_for_event.get());
            Ok(())
        })
        .unwrap();

    let _ = sim.run_to_end().unwrap();

    // Fires at the start of the iteration whose start time is 1.0, i.e.
    // after 10 completed steps and before the 11th.
    assert_eq!(*fired_at.borrow(), vec![10]);
    assert_eq!(sim.events().is_fired(id), Some(true));
    assert_eq!(sim.events().pending(), 0);
}

#[test]
fn event_scheduled_mid_run_for_the_past_fires_next_iteration() {
    let clock = Clock::new(0.5).unwrap();
    let mut sim = SimulationLoop::new(clock, RecordingStepper::new())
        .with_termination(Termination::new().with_max_steps(4));
    let scheduler = sim.event_scheduler();
    let (late, late_action) = counter();
    let mut late_action = Some(late_action);
    let _ = sim.events_mut().schedule(0.5, move || {
        if let Some(action) = late_action.take() {
            let _ = scheduler.schedule(0.0, action)?;
        }
        Ok(())
    });

    let mut reports = Collect::default();
    let _ = sim.run(&mut reports).unwrap();

    let events_per_step: Vec<usize> = reports.0.iter().map(|r| r.events_fired).collect();
    assert_eq!(events_per_step, vec![0, 1, 1, 0]);
    assert_eq!(late.get(), 1);
}

// =============================================================================
// Phases
// =============================================================================

#[derive(Default)]
struct Collect(Vec<StepReport>);

impl StepObserver for Collect {
    fn on_step(&mut self, report: &StepReport) {
        self.0.push(report.clone());
    }
}

#[test]
fn pose_settle_locomote_timeline() {
    let clock = Clock::new(0.25).unwrap();
    let phases = PhaseController::new(vec![
        PhaseSpec::finite("A", 1.0),
        PhaseSpec::finite("B", 0.5),
        PhaseSpec::unbounded("C"),
    ])
    .unwrap();
    let mut sim = SimulationLoop::new(clock, RecordingStepper::new())
        .with_phases(phases)
        .with_termination(Termination::at(3.0).unwrap());

    let log: Rc<RefCell<Vec<String>>> = Rc::default();
    for name in ["A", "B", "C"] {
        let enter = Rc::clone(&log);
        sim.phases_mut()
            .on_enter(name, move || {
                enter.borrow_mut().push(format!("enter {name}"));
                Ok(())
            })
            .unwrap();
        let exit = Rc::clone(&log);
        sim.phases_mut()
            .on_exit(name, move || {
                exit.borrow_mut().push(format!("exit {name}"));
                Ok(())
            })
            .unwrap();
    }

    let mut reports = Collect::default();
    let result = sim.run(&mut reports).unwrap();

    let crossings: Vec<(f64, String)> = reports
        .0
        .iter()
        .flat_map(|r| r.transitions.iter().map(|t| (t.elapsed, t.to_name.clone())))
        .collect();
    assert_eq!(crossings, vec![(1.0, "B".to_owned()), (1.5, "C".to_owned())]);
    assert_eq!(
        *log.borrow(),
        vec!["enter A", "exit A", "enter B", "exit B", "enter C"]
    );
    assert_eq!(result.final_phase.as_deref(), Some("C"));
}

#[test]
fn coarse_step_crosses_two_boundaries_in_one_iteration() {
    let clock = Clock::new(1.0).unwrap();
    let phases = PhaseController::new(vec![
        PhaseSpec::finite("A", 0.3),
        PhaseSpec::finite("B", 0.3),
        PhaseSpec::unbounded("C"),
    ])
    .unwrap();
    let mut sim = SimulationLoop::new(clock, RecordingStepper::new())
        .with_phases(phases)
        .with_termination(Termination::new().with_max_steps(2));

    let mut reports = Collect::default();
    let _ = sim.run(&mut reports).unwrap();

    let first = reports.0.first().unwrap();
    let second = reports.0.get(1).unwrap();
    assert!(first.transitions.is_empty());
    assert_eq!(first.phase.as_deref(), Some("A"));
    let crossed: Vec<(&str, &str)> = second
        .transitions
        .iter()
        .map(|t| (t.from_name.as_str(), t.to_name.as_str()))
        .collect();
    assert_eq!(crossed, vec![("A", "B"), ("B", "C")]);
    assert_eq!(second.phase.as_deref(), Some("C"));
}

#[test]
fn event_registers_periodic_task_joining_same_iteration() {
    let clock = Clock::new(0.1).unwrap();
    let mut sim = SimulationLoop::new(clock, RecordingStepper::new())
        .with_termination(Termination::new().with_max_steps(4));
    let registrar = sim.task_registrar();
    let (sampled, sample_action) = counter();
    let mut sample_action = Some(sample_action);
    let _ = sim
        .events_mut()
        .schedule_named("start sampling", 0.1, move || {
            if let Some(action) = sample_action.take() {
                let _ = registrar.register_named("sampler", 10.0, action)?;
            }
            Ok(())
        })
        .unwrap();

    let mut reports = Collect::default();
    let result = sim.run(&mut reports).unwrap();

    let tasks_per_step: Vec<usize> = reports.0.iter().map(|r| r.tasks_fired).collect();
    assert_eq!(tasks_per_step, vec![0, 1, 1, 1]);
    assert_eq!(sampled.get(), 3);
    assert_eq!(sim.tasks().len(), 1);
    assert_eq!(result.task_counts.first().map(|c| c.fires), Some(3));
}

// =============================================================================
// Failure isolation and termination
// =============================================================================

#[test]
fn failing_action_does_not_stop_siblings_or_next_step() {
    let clock = Clock::new(0.1).unwrap();
    let mut sim = SimulationLoop::new(clock, RecordingStepper::new())
        .with_termination(Termination::new().with_max_steps(3));
    let flaky_calls = Rc::new(Cell::new(0_u32));
    let flaky_in = Rc::clone(&flaky_calls);
    let _ = sim
        .tasks_mut()
        .register_named("flaky", 10.0, move || {
            flaky_in.set(flaky_in.get() + 1);
            if flaky_in.get() == 2 {
                panic!("camera buffer lost");
            }
            Err(anyhow::anyhow!("write failed"))
        })
        .unwrap();
    let (healthy, healthy_action) = counter();
    let _ = sim
        .tasks_mut()
        .register_named("healthy", 10.0, healthy_action)
        .unwrap();

    let mut reports = Collect::default();
    let result = sim.run(&mut reports).unwrap();

    assert_eq!(result.total_steps, 3);
    assert_eq!(healthy.get(), 3);
    assert_eq!(flaky_calls.get(), 3);
    assert_eq!(result.action_failures, 3);
    assert!(reports.0.iter().all(|r| r.tasks_fired == 2 && r.failures.len() == 1));
}

#[test]
fn stop_handle_ends_run_from_inside_an_action() {
    let clock = Clock::new(0.01).unwrap();
    let stop = StopHandle::new();
    let mut sim = SimulationLoop::new(clock, RecordingStepper::new())
        .with_termination(Termination::new().with_stop_handle(stop.clone()));
    let _ = sim.events_mut().schedule(0.05, move || {
        stop.request_stop();
        Ok(())
    });

    let result = sim.run_to_end().unwrap();

    assert_eq!(result.end_reason, RunEndReason::StopRequested);
    // The event fires at the start of step 6, which still completes.
    assert_eq!(result.total_steps, 6);
}

#[test]
fn liveness_signal_ends_run() {
    let clock = Clock::new(0.01).unwrap();
    let polls = Rc::new(Cell::new(0_u32));
    let polls_in = Rc::clone(&polls);
    let mut sim = SimulationLoop::new(clock, RecordingStepper::new()).with_termination(
        Termination::new().while_alive(move || {
            polls_in.set(polls_in.get() + 1);
            polls_in.get() <= 7
        }),
    );

    let result = sim.run_to_end().unwrap();

    assert_eq!(result.end_reason, RunEndReason::LivenessLost);
    assert_eq!(result.total_steps, 7);
    assert_eq!(polls.get(), 8);
}
