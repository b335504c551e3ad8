//! Main whole-body control executable entry point.
//!
//! # Architecture
//!
//! The executable closes the loop between the force controllers and the
//! cartesian quadruped model:
//!
//!     - Initialise the session, logging and parameters
//!     - Build the model, the frame graph and the runtime environment
//!     - Main loop:
//!         - Scenario events (step plan request, pushes)
//!         - Force controller processing
//!         - Plant simulation
//!         - Telemetry archiving
//!
//! The robot stands for `stand_duration_s`, then executes the step plan given
//! in the parameters and stands again once it is completed.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Report};
use log::{info, warn};
use std::thread;
use std::time::{Duration, Instant};

// Internal
use util::{
    archive::Archiver,
    host,
    logger::{logger_init, LevelFilter},
    module::Controller,
    params::ParameterRepository,
    session::Session,
};
use wbc_lib::{
    force_ctrl::{
        ForceControllerEvent, ForceControllerManager, QuadrupedReferenceFrames,
        RuntimeEnvironment, StaticInputProvider,
    },
    frames::FrameGraph,
    model::{CartesianQuadrupedModel, FullRobotModel},
    params::WbcExecParams,
    telemetry::ArchiveSink,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Target period of one cycle.
const CYCLE_PERIOD_S: f64 = 0.004;

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    // ---- EARLY INITIALISATION ----

    color_eyre::install()?;

    // Initialise session
    let session = Session::new("wbc_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger, the per-cycle control modules are kept at debug
    logger_init(
        LevelFilter::Trace,
        &[
            ("wbc_lib::task_space", LevelFilter::Debug),
            ("wbc_lib::model", LevelFilter::Debug),
            ("wbc_lib::dcm_ctrl", LevelFilter::Debug),
            ("wbc_lib::accel_ctrl", LevelFilter::Debug),
        ],
        &session,
    )
    .wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Whole-Body Control Executable\n");
    info!("Running on: {}", host::get_platform());
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let exec_params: WbcExecParams =
        util::params::load("wbc_exec.toml").wrap_err("Could not load exec params")?;

    let gains: ParameterRepository = util::params::load(&exec_params.gains_file)
        .wrap_err("Could not load the controller gains")?;

    info!("Exec parameters loaded");

    // ---- INITIALISE ENVIRONMENT ----

    let mut frames = FrameGraph::new();
    let model = CartesianQuadrupedModel::new(exec_params.model.clone(), &mut frames);
    let reference_frames = QuadrupedReferenceFrames::new(&mut frames);
    let input = StaticInputProvider::standing(
        reference_frames.support_frame(),
        exec_params.com_height_m,
    );

    let telemetry = ArchiveSink::new(
        Archiver::from_path(&session, "wbc_telemetry.csv")
            .wrap_err("Failed to create the telemetry archive")?,
    );

    let mut env = RuntimeEnvironment::new(
        model,
        frames,
        reference_frames,
        input,
        gains,
        Box::new(telemetry),
        CYCLE_PERIOD_S,
    );

    // ---- INITIALISE CONTROLLERS ----

    let mut manager = ForceControllerManager::new(&mut env)
        .wrap_err("Failed to initialise the force controllers")?;
    manager
        .on_entry(&mut env)
        .wrap_err("Failed to enter the force controllers")?;

    info!("Force controllers initialised");

    // ---- MAIN LOOP ----

    info!("Begining main loop\n");

    let mut steps_requested = exec_params.steps.is_empty();
    let mut push_applied = exec_params.push.is_none();
    let mut num_overruns: u64 = 0;

    while env.clock.time_s() < exec_params.run_duration_s {
        // Get cycle start time
        let cycle_start_instant = Instant::now();
        let time_s = env.clock.time_s();

        // ---- SCENARIO ----

        if !steps_requested && time_s >= exec_params.stand_duration_s {
            let world = env.world_frame();
            let plan = exec_params
                .steps
                .iter()
                .map(|s| s.to_timed_step(&env.model, world))
                .collect();
            manager.set_step_plan(plan);
            steps_requested = true;
        }

        if let Some(push) = exec_params.push.as_ref().filter(|p| time_s >= p.time_s) {
            if !push_applied {
                info!("Pushing the body by {:?} m/s", push.delta_velocity_mps);
                env.model.push(push.delta_velocity());

                if let Some(q) = push.replan_quadrant {
                    if !manager.replan_swing(q, push.replan_time_remaining_s) {
                        warn!("Could not replan the {} swing", q.name());
                    }
                }
                push_applied = true;
            }
        }

        // ---- CONTROL ALGORITHM PROCESSING ----

        match manager
            .process(&mut env)
            .wrap_err("Error during force control processing")?
        {
            Some(ForceControllerEvent::StepsCompleted) => {
                info!("Steps completed at {:.3} s", time_s)
            }
            None => (),
        }

        // ---- PLANT ----

        let contact = *manager.contact_states();
        let gravity_mps2 = env.gravity_mps2;
        env.model
            .step_simulation(&contact, gravity_mps2, CYCLE_PERIOD_S, &mut env.frames);

        // ---- WRITE ARCHIVES ----

        env.end_cycle().wrap_err("Failed to archive telemetry")?;

        // ---- CYCLE MANAGEMENT ----

        if exec_params.real_time {
            let cycle_dur = Instant::now() - cycle_start_instant;

            match Duration::from_secs_f64(CYCLE_PERIOD_S).checked_sub(cycle_dur) {
                Some(d) => thread::sleep(d),
                None => {
                    num_overruns += 1;
                    warn!(
                        "Cycle overran by {:.06} s",
                        cycle_dur.as_secs_f64() - CYCLE_PERIOD_S
                    );
                }
            }
        }
    }

    // ---- SHUTDOWN ----

    manager
        .on_exit(&mut env)
        .wrap_err("Failed to exit the force controllers")?;

    let com = env.model.com_position();
    info!(
        "Final CoM position: ({:.3}, {:.3}, {:.3}) m",
        com.x(),
        com.y(),
        com.z()
    );
    if num_overruns > 0 {
        warn!("{} cycles overran", num_overruns);
    }

    info!("End of execution");

    Ok(())
}
