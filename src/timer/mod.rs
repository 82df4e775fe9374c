pub mod controller;
pub mod state;
pub mod ticker;

pub use controller::{system_clock, Clock, TimerController, TimerNotification};
pub use state::{RunMode, TimerSnapshot, TimerState, TimerStatus};
