//! Call-control state machines: barge-in, number-mode muting, the idle
//! watchdog, and the auto-press removal engine.

pub mod auto_press;
pub mod barge_in;
pub mod idle;
pub mod number_mode;
