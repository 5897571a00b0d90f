//! The pose/settle/locomote robot scenario.
//!
//! The robot is posed in the air for `duration_pose` seconds. Terrain is
//! then created under it and it settles for `duration_settle` seconds,
//! after which the driver runs its gait for `duration_sim` seconds. Data
//! rows are written at `output_fps`; snapshot frames and screenshots are
//! taken at `render_fps`, each behind its own flag. An optional ticker publishes a counter at `publish.frequency_hz`.
//!
//! The timeline is expressed as a [`ScheduleConfig`] so the scheduler does
//! all the timing; this module only binds actions to the configured names.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use cadence_core::collaborator::PhysicsStepper;
use cadence_core::config::{EventConfig, PeriodicConfig, PhaseConfig, ScheduleConfig};
use cadence_core::operator::StopHandle;
use cadence_core::pacing::RealtimePacer;
use cadence_core::runner::{RunResult, SimulationLoop};
use cadence_types::LocomotionMode;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::DemoError;
use crate::output::{DataLog, FrameCapture, Sample, ScreenshotLog};
use crate::publisher::TickPublisher;
use crate::robot::{DemoRobot, DriverProfile, LOCOMOTE_PHASE, LocomotionDriver, RobotState};
use crate::step_logger::StepLogger;

/// Periodic task writing a data row.
pub const DATA_OUTPUT_TASK: &str = "data_output";
/// Periodic task writing a snapshot frame.
pub const FRAME_OUTPUT_TASK: &str = "frame_output";
/// Periodic task taking a screenshot.
pub const IMAGE_OUTPUT_TASK: &str = "image_output";
/// Periodic task publishing a tick.
pub const TICKER_TASK: &str = "ticker";
/// Timed event creating terrain under the robot.
pub const CREATE_TERRAIN_EVENT: &str = "create_terrain";

/// Scenario configuration, read from the `scenario` section of
/// `cadence-config.yaml`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScenarioConfig {
    /// Locomotion mode of the driver.
    #[serde(default)]
    pub mode: LocomotionMode,

    /// Drop the robot onto terrain created after posing. When false the
    /// terrain exists from the start.
    #[serde(default = "default_true")]
    pub drop: bool,

    /// Seconds spent posing before terrain is created.
    #[serde(default = "default_duration_pose")]
    pub duration_pose: f64,

    /// Seconds spent settling on the terrain.
    #[serde(default = "default_duration_settle")]
    pub duration_settle: f64,

    /// Seconds of locomotion.
    #[serde(default = "default_duration_sim")]
    pub duration_sim: f64,

    /// Data output rate (Hz).
    #[serde(default = "default_output_fps")]
    pub output_fps: f64,

    /// Frame capture and screenshot rate (Hz).
    #[serde(default = "default_render_fps")]
    pub render_fps: f64,

    /// Write data rows.
    #[serde(default = "default_true")]
    pub data_output: bool,

    /// Write snapshot frames.
    #[serde(default)]
    pub frame_output: bool,

    /// Take screenshots.
    #[serde(default)]
    pub image_output: bool,

    /// Publish ticks.
    #[serde(default)]
    pub ticker: bool,

    /// Output directory.
    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            mode: LocomotionMode::default(),
            drop: true,
            duration_pose: default_duration_pose(),
            duration_settle: default_duration_settle(),
            duration_sim: default_duration_sim(),
            output_fps: default_output_fps(),
            render_fps: default_render_fps(),
            data_output: true,
            frame_output: false,
            image_output: false,
            ticker: false,
            out_dir: default_out_dir(),
        }
    }
}

impl ScenarioConfig {
    /// Time at which terrain is created.
    pub const fn time_create_terrain(&self) -> f64 {
        self.duration_pose
    }

    /// Time at which locomotion starts.
    pub fn time_start(&self) -> f64 {
        self.time_create_terrain() + self.duration_settle
    }

    /// Time at which the run ends.
    pub fn time_end(&self) -> f64 {
        self.time_start() + self.duration_sim
    }

    /// The scenario timeline as a schedule, keeping the step size and step
    /// bound of `base`. Anything else set in `base` is logged and ignored.
    ///
    /// Terrain creation and the pose/settle boundary are scheduled
    /// independently even though both derive from `duration_pose`.
    pub fn schedule(&self, base: &ScheduleConfig, ticker_hz: f64) -> ScheduleConfig {
        for key in overridden_schedule_keys(base) {
            warn!(key, "schedule.{key} is ignored; the scenario defines its own timeline");
        }
        let periodic = |name: &str, frequency_hz: f64, enabled: bool| PeriodicConfig {
            name: name.to_owned(),
            frequency_hz,
            enabled,
        };
        let mut events = Vec::new();
        if self.drop {
            events.push(EventConfig {
                name: CREATE_TERRAIN_EVENT.to_owned(),
                trigger_time: self.time_create_terrain(),
            });
        }

        ScheduleConfig {
            step_size: base.step_size,
            end_time: Some(self.time_end()),
            max_steps: base.max_steps,
            phases: vec![
                PhaseConfig {
                    name: "pose".to_owned(),
                    duration: Some(self.duration_pose),
                },
                PhaseConfig {
                    name: "settle".to_owned(),
                    duration: Some(self.duration_settle),
                },
                PhaseConfig {
                    name: LOCOMOTE_PHASE.to_owned(),
                    duration: None,
                },
            ],
            periodic: vec![
                periodic(DATA_OUTPUT_TASK, self.output_fps, self.data_output),
                periodic(FRAME_OUTPUT_TASK, self.render_fps, self.frame_output),
                periodic(IMAGE_OUTPUT_TASK, self.render_fps, self.image_output),
                periodic(TICKER_TASK, ticker_hz, self.ticker),
            ],
            events,
        }
    }
}

/// Keys of the `schedule` section that the scenario replaces.
pub fn overridden_schedule_keys(base: &ScheduleConfig) -> Vec<&'static str> {
    let mut keys = Vec::new();
    if base.end_time.is_some() {
        keys.push("end_time");
    }
    if !base.phases.is_empty() {
        keys.push("phases");
    }
    if !base.periodic.is_empty() {
        keys.push("periodic");
    }
    if !base.events.is_empty() {
        keys.push("events");
    }
    keys
}

/// Everything a run needs besides the schedule.
#[derive(Debug)]
pub struct RunOptions {
    /// Pace the run against wall-clock time.
    pub realtime: bool,
    /// Progress log interval in steps.
    pub step_log_interval: u64,
    /// Stop flag raised on Ctrl-C.
    pub stop: StopHandle,
    /// Tick producer, when publishing.
    pub ticks: Option<TickPublisher>,
}

/// Outcome of a scenario run.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioOutcome {
    /// The scheduler's run result.
    pub result: RunResult,
    /// Average forward speed during locomotion, if it started.
    pub avg_speed: Option<f64>,
    /// Data rows written.
    pub data_rows: u64,
    /// Frames written.
    pub frames: u64,
    /// Screenshots taken.
    pub screenshots: u64,
}

/// Build the loop for `scenario` on `schedule` and run it to the end.
///
/// # Errors
///
/// Returns a [`DemoError`] if the schedule is malformed, an output sink
/// cannot be created, or the engine fails.
pub fn run(
    scenario: &ScenarioConfig,
    schedule: &ScheduleConfig,
    options: RunOptions,
) -> Result<ScenarioOutcome, DemoError> {
    let initial_phase = schedule
        .phases
        .first()
        .map_or("", |phase| phase.name.as_str());
    let robot = Rc::new(RefCell::new(RobotState::posed(initial_phase)));
    if !scenario.drop {
        robot.borrow_mut().create_terrain();
    }

    let engine = DemoRobot::new(Rc::clone(&robot));
    let stepper: Box<dyn PhysicsStepper> = if options.realtime {
        Box::new(RealtimePacer::new(engine))
    } else {
        Box::new(engine)
    };

    let termination = schedule.termination()?.with_stop_handle(options.stop);
    let mut sim = SimulationLoop::from_config(schedule, stepper)?.with_termination(termination);

    let profile = DriverProfile::for_mode(scenario.mode);
    info!(
        mode = %profile.mode,
        cycle = profile.cycle_file,
        time_create_terrain = scenario.time_create_terrain(),
        time_start = scenario.time_start(),
        time_end = scenario.time_end(),
        "Scenario configured"
    );
    let driver = Rc::new(RefCell::new(LocomotionDriver::new(profile, Rc::clone(&robot))));
    let listener = Rc::clone(&driver);
    sim.phases_mut().on_transition(move |transition| {
        listener.borrow_mut().on_phase_change(transition);
        Ok(())
    });

    for event in &schedule.events {
        if event.name == CREATE_TERRAIN_EVENT {
            let terrain = Rc::clone(&robot);
            let _ = sim
                .events_mut()
                .schedule_named(&event.name, event.trigger_time, move || {
                    terrain.borrow_mut().create_terrain();
                    Ok(())
                })?;
        } else {
            warn!(event = event.name, "No action bound to event, skipping");
        }
    }

    let mut data_log: Option<Rc<RefCell<DataLog>>> = None;
    let mut frames: Option<Rc<RefCell<FrameCapture>>> = None;
    let mut screenshots: Option<Rc<RefCell<ScreenshotLog>>> = None;
    let mut ticks = options.ticks;
    for task in schedule.periodic.iter().filter(|task| task.enabled) {
        match task.name.as_str() {
            DATA_OUTPUT_TASK => {
                let sink = Rc::new(RefCell::new(DataLog::create(&scenario.out_dir)?));
                let (log, state) = (Rc::clone(&sink), Rc::clone(&robot));
                let _ = sim.tasks_mut().register_named(&task.name, task.frequency_hz, move || {
                    log.borrow_mut().record(&Sample::from(&*state.borrow()))?;
                    Ok(())
                })?;
                data_log = Some(sink);
            }
            FRAME_OUTPUT_TASK => {
                let sink = Rc::new(RefCell::new(FrameCapture::create(
                    scenario.out_dir.join("FRAMES"),
                    "data",
                    "dat",
                )?));
                let (capture, state) = (Rc::clone(&sink), Rc::clone(&robot));
                let _ = sim.tasks_mut().register_named(&task.name, task.frequency_hz, move || {
                    let _ = capture.borrow_mut().capture(&Sample::from(&*state.borrow()))?;
                    Ok(())
                })?;
                frames = Some(sink);
            }
            IMAGE_OUTPUT_TASK => {
                let sink = Rc::new(RefCell::new(ScreenshotLog::new(scenario.out_dir.join("IMG"))));
                let (shots, state) = (Rc::clone(&sink), Rc::clone(&robot));
                let _ = sim.tasks_mut().register_named(&task.name, task.frequency_hz, move || {
                    let _ = shots.borrow_mut().capture(state.borrow().time);
                    Ok(())
                })?;
                screenshots = Some(sink);
            }
            TICKER_TASK => {
                let Some(mut publisher) = ticks.take() else {
                    warn!("Ticker enabled without a publisher, skipping");
                    continue;
                };
                let state = Rc::clone(&robot);
                let _ = sim.tasks_mut().register_named(&task.name, task.frequency_hz, move || {
                    let now = state.borrow().time;
                    publisher.tick(now)
                })?;
            }
            other => warn!(task = other, "No action bound to periodic task, skipping"),
        }
    }

    let mut logger = StepLogger::new(options.step_log_interval);
    let result = sim.run(&mut logger)?;
    debug!(progress_lines = logger.logged(), "Step logger finished");

    let data_rows = match &data_log {
        Some(sink) => {
            let mut sink = sink.borrow_mut();
            sink.flush()?;
            sink.rows()
        }
        None => 0,
    };
    let frames = frames.map_or(0, |sink| sink.borrow().frames());
    let screenshots = screenshots.map_or(0, |sink| sink.borrow().shots());
    let avg_speed = driver.borrow().avg_speed();

    Ok(ScenarioOutcome {
        result,
        avg_speed,
        data_rows,
        frames,
        screenshots,
    })
}

const fn default_true() -> bool {
    true
}

const fn default_duration_pose() -> f64 {
    1.0
}

const fn default_duration_settle() -> f64 {
    0.5
}

const fn default_duration_sim() -> f64 {
    10.0
}

const fn default_output_fps() -> f64 {
    100.0
}

const fn default_render_fps() -> f64 {
    60.0
}

fn default_out_dir() -> PathBuf {
    PathBuf::from("./cadence_output")
}
