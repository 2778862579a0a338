//! Module interfaces
//!
//! Each cyclically processed module in `ds_exec` (match clock, battery
//! monitor, state fusion) implements [`State`]. The executive initialises a
//! module once with its parameters and then calls `proc` exactly once per
//! control cycle, passing the cycle's monotonic timestamp: modules never
//! read a clock themselves, which is what lets the tests drive them with
//! fabricated instants.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use std::time::Instant;

// ---------------------------------------------------------------------------
// MODULE STATE
// ---------------------------------------------------------------------------

/// The module's internal state.
pub trait State {
    /// Data required during initialisation, normally the module's parameter
    /// struct.
    type InitData;
    /// An error which can occur during initialisation.
    type InitError;

    /// Data required for cyclic processing, gathered by the executive from
    /// the data store. The cycle timestamp is not part of this: it is passed
    /// to `proc` directly.
    type InputData;
    /// Data produced by cyclic processing.
    type OutputData;
    /// A report on the status of the cyclic processing, carrying the
    /// module's one-shot demands and change notifications for this cycle.
    type StatusReport;
    /// An error which can occur during cyclic processing.
    type ProcError;

    /// Initialise the module.
    ///
    /// # Inputs
    /// - `init_data`: The input data required by the module
    ///
    /// # Outputs
    /// - On success `Ok(())`.
    /// - On error an `InitError` instance.
    fn init(&mut self, init_data: Self::InitData)
        -> Result<(), Self::InitError>;

    /// Main module processing function, called once per control cycle.
    ///
    /// # Inputs
    /// - `now`: The monotonic timestamp of this cycle. All timeouts and
    ///   deadlines inside the module are measured against it.
    /// - `input_data`: The data required for processing by the module.
    ///
    /// # Outputs
    /// - On success a tuple of the output data and status report.
    /// - On error a `ProcError` instance.
    fn proc(&mut self, now: Instant, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>;
}
