//! Session lifecycle
//!
//! Connection state, retained resume data, reconnect pacing, and the
//! controller that drives them.

mod controller;
mod retry;
mod session;
mod state;

pub use controller::SessionController;
pub use retry::RetryState;
pub use session::{SequenceCheck, Session};
pub use state::SessionState;
