//! Session management
//!
//! A session is one execution of a station executable: a timestamped
//! directory under the software root holding that run's log file. The
//! session epoch is captured twice at creation, as a wall-clock time that
//! names the directory and as a monotonic instant that every elapsed-time
//! reading (log timestamps included) is measured against, so log timebases
//! never jump with the system clock.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use chrono::{DateTime, Utc};
use conquer_once::OnceCell;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;
use thiserror::Error;

// ---------------------------------------------------------------------------
// STATICS
// ---------------------------------------------------------------------------

static SESSION_EPOCH: OnceCell<SessionEpoch> = OnceCell::uninit();

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// A chrono format string which displays a timestamp. See
/// https://docs.rs/chrono/0.4.11/chrono/format/strftime/index.html for more
/// information.
const TIMESTAMP_FORMAT: &'static str = "%Y%m%d_%H%M%S";

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The two captures of the session start: wall-clock for naming, monotonic
/// for elapsed-time measurement.
struct SessionEpoch {
    wall: DateTime<Utc>,
    mono: Instant
}

/// A struct storing information about the current session
pub struct Session {
    /// The root directory for this session
    pub session_root: PathBuf,

    /// The path to the session's log file
    pub log_file_path: PathBuf,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors associated with the session module.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("The software root environment variable (DS_SW_ROOT) is not set")]
    SwRootNotSet,

    #[error("Cannot create the session directory: {0}")]
    CannotCreateDir(std::io::Error),

    #[error(
        "The session epoch is already set, only one session may exist per \
        execution (conquer_once error: {0})")]
    CannotInitEpoch(conquer_once::TryInitError),

    #[error("Cannot get the epoch time, did you forget to initialise the session?")]
    CannotGetEpoch
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Session {

    /// Start a new session within the given directory.
    ///
    /// This will create a new session directory named `{exec_name}_{timestamp}`
    /// under `$DS_SW_ROOT/{sessions_dir}` and fix the session epoch. Only one
    /// session may be created per execution.
    pub fn new(
        exec_name: &str, sessions_dir: &str
    ) -> Result<Self, SessionError> {

        // Set the session epoch
        match SESSION_EPOCH.try_init_once(|| SessionEpoch {
            wall: Utc::now(),
            mono: Instant::now()
        }) {
            Ok(_) => (),
            Err(e) => return Err(SessionError::CannotInitEpoch(e))
        };

        // Format the wall-clock epoch as the directory timestamp
        let timestamp = match SESSION_EPOCH.get() {
            Some(e) => e.wall.format(TIMESTAMP_FORMAT),
            None => return Err(SessionError::CannotGetEpoch)
        };

        // Get the root directory
        let root = ds_sw_root().map_err(|_| SessionError::SwRootNotSet)?;

        // Create the session path
        let mut path: PathBuf = root;
        path.push(String::from(sessions_dir));
        path.push(format!("{}_{}", exec_name, timestamp));

        // Create the directory
        match fs::create_dir_all(path.clone()) {
            Ok(_) => (),
            Err(e) => return Err(SessionError::CannotCreateDir(e))
        };

        // Create the log file path
        let mut log_file_path = path.clone();
        log_file_path.push(format!("{}.log", exec_name));

        // Build the session struct
        Ok(Session {
            session_root: path,
            log_file_path
        })
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Get the number of seconds elapsed since the start of the session.
///
/// Measured against the monotonic epoch, so it is immune to system clock
/// changes. Returns zero if no session exists yet, so logging set up before
/// the session doesn't panic.
pub fn get_elapsed_seconds() -> f64 {
    match SESSION_EPOCH.get() {
        Some(e) => e.mono.elapsed().as_secs_f64(),
        None => 0.0
    }
}

/// The wall-clock time the session started at, or `None` if no session
/// exists yet.
pub fn get_epoch() -> Option<DateTime<Utc>> {
    SESSION_EPOCH.get().map(|e| e.wall)
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Root of the software installation, from the `DS_SW_ROOT` environment
/// variable.
fn ds_sw_root() -> Result<PathBuf, std::env::VarError> {
    std::env::var("DS_SW_ROOT").map(PathBuf::from)
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
