//! Module interfaces
//!
//! Every cyclic controller in `wbc_exec` implements [`Controller`], which
//! gives the orchestration layer a uniform lifecycle to drive: `on_entry`
//! when the controller becomes active, `process` once per control cycle and
//! `on_exit` when it is replaced.

// ---------------------------------------------------------------------------
// CONTROLLER LIFECYCLE
// ---------------------------------------------------------------------------

/// A controller which can be sequenced by a state machine.
///
/// `Env` is the context shared by all controllers of a state machine (robot
/// model, reference frames, parameters, telemetry...). It is passed by
/// reference on every call rather than held by the controller.
pub trait Controller<Env> {
    /// An event which may be emitted from `process` to request a transition.
    type Event;

    /// An error which can occur during any lifecycle call.
    type Error;

    /// Called once when the controller becomes active.
    ///
    /// Implementations shall reset any integrator state here.
    fn on_entry(&mut self, env: &mut Env) -> Result<(), Self::Error>;

    /// Main cyclic processing function.
    ///
    /// # Outputs
    /// - `Ok(None)` if no transition is requested.
    /// - `Ok(Some(event))` to request a transition at the next cycle boundary.
    /// - On error a `Self::Error` instance.
    fn process(&mut self, env: &mut Env) -> Result<Option<Self::Event>, Self::Error>;

    /// Called once when the controller is replaced by another one.
    fn on_exit(&mut self, _env: &mut Env) -> Result<(), Self::Error> {
        Ok(())
    }
}
