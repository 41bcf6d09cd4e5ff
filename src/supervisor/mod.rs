pub mod launch;
pub mod monitor;
pub mod process;

pub use launch::LaunchSpec;
pub use process::{ProcessPhase, ProcessState, ProcessSupervisor};
