//! # Station command script interpreter module
//!
//! This module provides an interpreter for station command scripts, used for
//! headless bring-up and soak testing where no operator UI is attached.
//!
//! A script is a sequence of lines, one command per line:
//!
//! ```text
//! # Connect, then enable two seconds later
//! 1.0: {"type": "CONNECT"};
//! +2.0: {"type": "ENABLE"};
//! ```
//!
//! A timestamp is either absolute seconds from script start (`5.0:`) or an
//! offset from the previous command (`+2.0:`). Blank lines and `#` comments
//! are skipped; anything else must parse, and command times must never run
//! backwards - a script that drives a robot is refused whole rather than
//! executed partially. The caller feeds the interpreter its own elapsed-time
//! reading each cycle, so dispatch is deterministic under test.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::fs;
use regex::Regex;
use thiserror::Error;

// Internal
use comms_if::tc::{StationCommand, CommandParseError};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A command which is scripted to occur at a specific time.
struct Command {
    /// The time the command is supposed to execute at, in seconds from
    /// script start
    exec_time_s: f64,

    /// The station command to run
    cmd: StationCommand
}

/// A script interpreter.
///
/// After initialising with the path to the script to run, call
/// [`ScriptInterpreter::pending`] once per cycle with the elapsed time to
/// collect the commands that are due.
pub struct ScriptInterpreter {
    _script_path: PathBuf,
    cmds: VecDeque<Command>,
    duration_s: f64
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Could not find the script at {0}")]
    ScriptNotFound(String),

    #[error("Could not load the script: {0}")]
    ScriptLoadError(std::io::Error),

    #[error("The script contains no commands")]
    ScriptEmpty,

    #[error(
        "Line {0} is not a comment and not a command, expected \
        \"<time>: <command json>;\"")]
    MalformedLine(usize),

    #[error("Line {0}: \"{1}\" is not a valid timestamp")]
    InvalidTimestamp(usize, String),

    #[error("Line {0}: command time {1} s is earlier than the command before it")]
    OutOfOrderTimestamp(usize, f64),

    #[error("Line {0}: invalid command: {1}")]
    InvalidCommand(usize, CommandParseError)
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ScriptInterpreter {

    /// Create a new interpreter from the given script path.
    pub fn new<P: AsRef<Path>>(script_path: P) -> Result<Self, ScriptError> {

        // Get the path in a buffer
        let path = PathBuf::from(script_path.as_ref());

        // Check that the script file exists.
        if !path.exists() {
            return Err(
                ScriptError::ScriptNotFound(path.to_string_lossy().to_string()));
        }

        // Load the script into a string
        let script = match fs::read_to_string(script_path) {
            Ok(s) => s,
            Err(e) => return Err(ScriptError::ScriptLoadError(e))
        };

        Self::from_str(&script, path)
    }

    /// Build an interpreter from a script already in memory.
    ///
    /// The whole script is validated up front: one bad line refuses the
    /// script, nothing is ever half-executed.
    fn from_str(script: &str, path: PathBuf) -> Result<Self, ScriptError> {

        // One command per line: an absolute or `+`-relative timestamp, a
        // colon, a JSON object, a closing semicolon
        let line_re = Regex::new(
            r"^(\+?\d+(?:\.\d+)?)\s*:\s*(\{.*\})\s*;$"
        ).unwrap();

        let mut cmds: VecDeque<Command> = VecDeque::new();
        let mut last_time_s = 0f64;

        for (idx, raw_line) in script.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw_line.trim();

            // Blank lines and comments carry nothing
            if line.is_empty() || line.starts_with('#') {
                continue
            }

            let caps = match line_re.captures(line) {
                Some(c) => c,
                None => return Err(ScriptError::MalformedLine(line_no))
            };

            // Resolve the timestamp, relative ones chain off the previous
            // command
            let time_str = &caps[1];
            let (relative, digits) = match time_str.strip_prefix('+') {
                Some(rest) => (true, rest),
                None => (false, time_str)
            };

            let offset_s: f64 = match digits.parse() {
                Ok(t) => t,
                Err(_) => return Err(ScriptError::InvalidTimestamp(
                    line_no, time_str.to_string()
                ))
            };

            let exec_time_s = if relative {
                last_time_s + offset_s
            }
            else {
                offset_s
            };

            if exec_time_s < last_time_s {
                return Err(ScriptError::OutOfOrderTimestamp(
                    line_no, exec_time_s
                ))
            }

            // Parse the command itself
            let cmd = match StationCommand::from_json(&caps[2]) {
                Ok(c) => c,
                Err(e) => return Err(ScriptError::InvalidCommand(line_no, e))
            };

            last_time_s = exec_time_s;
            cmds.push_back(Command { exec_time_s, cmd });
        }

        if cmds.is_empty() {
            return Err(ScriptError::ScriptEmpty)
        }

        Ok(ScriptInterpreter {
            _script_path: path,
            cmds,
            duration_s: last_time_s
        })
    }

    /// Collect the commands due at the given elapsed time, in script order.
    ///
    /// A command is due once `elapsed_s` reaches its execution time. The
    /// caller supplies the elapsed time rather than this module reading a
    /// clock, so tests dispatch deterministically.
    pub fn pending(&mut self, elapsed_s: f64) -> Vec<StationCommand> {
        let mut due = vec![];

        while self.cmds
            .front()
            .map(|c| c.exec_time_s <= elapsed_s)
            .unwrap_or(false)
        {
            if let Some(command) = self.cmds.pop_front() {
                due.push(command.cmd);
            }
        }

        due
    }

    /// Whether every command in the script has been dispatched.
    pub fn finished(&self) -> bool {
        self.cmds.is_empty()
    }

    /// Number of commands not yet dispatched.
    pub fn num_commands(&self) -> usize {
        self.cmds.len()
    }

    /// Execution time of the script's last command, in seconds.
    pub fn duration_s(&self) -> f64 {
        self.duration_s
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn parse(script: &str) -> Result<ScriptInterpreter, ScriptError> {
        ScriptInterpreter::from_str(script, PathBuf::from("test.dss"))
    }

    #[test]
    fn test_parse_script() {
        let si = parse("\
            # bring-up\n\
            0.5: {\"type\": \"CONNECT\"};\n\
            \n\
            2.0: {\"type\": \"MODE\", \"payload\": {\"mode\": \"AUTO\"}};\n\
            +1.0: {\"type\": \"ENABLE\"};\n"
        ).unwrap();

        assert_eq!(si.num_commands(), 3);

        // The relative offset chains off the 2.0 s command
        assert_eq!(si.duration_s(), 3.0);
    }

    #[test]
    fn test_pending_dispatch() {
        let mut si = parse("\
            1.0: {\"type\": \"CONNECT\"};\n\
            +1.0: {\"type\": \"ENABLE\"};\n\
            +0.0: {\"type\": \"DISABLE\"};\n"
        ).unwrap();

        assert!(si.pending(0.5).is_empty());
        assert!(!si.finished());

        assert_eq!(si.pending(1.0), vec![StationCommand::Connect]);

        // Both the 2.0 s commands fire together, in script order
        assert_eq!(
            si.pending(5.0),
            vec![StationCommand::Enable, StationCommand::Disable]
        );
        assert!(si.finished());
        assert!(si.pending(10.0).is_empty());
    }

    #[test]
    fn test_empty_script() {
        assert!(matches!(
            parse("# nothing but comments\n\n"),
            Err(ScriptError::ScriptEmpty)
        ));
    }

    #[test]
    fn test_malformed_line_refused() {
        // A typo must refuse the whole script, not run half of it
        assert!(matches!(
            parse("\
                1.0: {\"type\": \"CONNECT\"};\n\
                2.0  {\"type\": \"ENABLE\"};\n"
            ),
            Err(ScriptError::MalformedLine(2))
        ));

        // Missing trailing semicolon
        assert!(matches!(
            parse("1.0: {\"type\": \"CONNECT\"}"),
            Err(ScriptError::MalformedLine(1))
        ));
    }

    #[test]
    fn test_out_of_order_refused() {
        assert!(matches!(
            parse("\
                5.0: {\"type\": \"CONNECT\"};\n\
                2.0: {\"type\": \"ENABLE\"};\n"
            ),
            Err(ScriptError::OutOfOrderTimestamp(2, _))
        ));
    }

    #[test]
    fn test_bad_command_refused() {
        assert!(matches!(
            parse("1.0: {\"type\": \"WARP\"};"),
            Err(ScriptError::InvalidCommand(1, _))
        ));
    }
}
