//! Main driver station executable entry point.
//!
//! # Architecture
//!
//! The general execution methodology consists of:
//!
//!     - Initialise the session, logging and parameters
//!     - Build the executive (sockets, modules, data store)
//!     - Main loop at the configured send rate:
//!         - Feed any scripted operator commands
//!         - Run one executive cycle
//!         - Sleep out the remainder of the period
//!
//! Run headless the executive has no operator UI and no input devices; a
//! command script (single CLI argument) stands in for the operator, which is
//! how soak runs and bring-up are done. An embedding UI shell uses
//! `ds_exec` as a library instead and feeds commands and device events
//! through [`DsExec`]'s queues.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{info, warn};
use std::env;
use std::thread;
use std::time::{Duration, Instant};
use color_eyre::{Report, eyre::{WrapErr, eyre}};

// Internal
use ds_exec::{exec::DsExec, params::DsExecParams};
use util::{
    logger::{logger_init, LevelFilter},
    script_interpreter::ScriptInterpreter,
    session::{self, Session}
};

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new(
        "ds_exec",
        "sessions"
    ).wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Trace, &session)
        .wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Driver Station Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let params: DsExecParams = util::params::load("ds_exec.toml")
        .wrap_err("Could not load exec params")?;

    info!("Exec parameters loaded");

    // ---- INITIALISE COMMAND SOURCE ----

    // With a single argument the executive is driven by a command script,
    // with no arguments it idles waiting for an embedder (useful only for
    // soak testing the link).
    let args: Vec<String> = env::args().collect();

    let mut script = match args.len() {
        1 => {
            info!("No command script provided, executive will idle\n");
            None
        },
        2 => {
            info!("Loading command script from \"{}\"", &args[1]);

            let si = ScriptInterpreter::new(&args[1])
                .wrap_err("Failed to load command script")?;

            info!(
                "Loaded script lasts {:.02} s and contains {} commands\n",
                si.duration_s(),
                si.num_commands()
            );

            Some(si)
        },
        n => return Err(eyre!(
            "Expected either zero or one argument, found {}", n - 1
        ))
    };

    // ---- INITIALISE EXECUTIVE ----

    let mut exec = DsExec::new(params.clone())
        .wrap_err("Failed to initialise the executive")?;

    let cycle_period = Duration::from_millis(params.network.send_interval_ms);

    // ---- MAIN LOOP ----

    info!("Begining main loop\n");

    loop {

        // Get cycle start time
        let cycle_start = Instant::now();

        // ---- SCRIPTED COMMANDS ----

        if let Some(si) = script.as_mut() {
            // Exit once every scripted command has been dispatched and run
            if si.finished() {
                info!("End of command script reached, stopping");
                break
            }

            for cmd in si.pending(session::get_elapsed_seconds()) {
                exec.push_command(cmd);
            }
        }

        // ---- CYCLE PROCESSING ----

        exec.cycle(cycle_start);

        // ---- CYCLE MANAGEMENT ----

        let cycle_dur = Instant::now() - cycle_start;

        // Get sleep duration
        match cycle_period.checked_sub(cycle_dur) {
            Some(d) => thread::sleep(d),
            None => {
                warn!(
                    "Cycle overran by {:.06} s",
                    (cycle_dur - cycle_period).as_secs_f64()
                );
            }
        }
    }

    // ---- SHUTDOWN ----

    info!("End of execution");

    Ok(())
}
