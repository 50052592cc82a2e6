//! Recallbot - command parsing, console adapter and logging around the
//! conversation memory engine

pub mod commands;
pub mod console;
pub mod logging;
