#![forbid(unsafe_code)]
#![deny(unreachable_pub)]

//! Driver/worker dispatch core, DAB search state machine, and
//! solution-queue subsystem.

pub mod api;

mod agents;
mod driver;
mod objective;
mod prob_matrix;
mod problem;
mod queue;
mod transport;
mod worker;

pub use api::*;
