#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

pub mod report;
pub mod run;
pub mod schedule;

pub(crate) mod aggregator;
pub(crate) mod executor;
pub(crate) mod measurement;
pub(crate) mod pool;
pub(crate) mod timer;

pub use report::{CheckGate, RunReport};
pub use run::{LoadTest, RunError, RunPhase};
pub use schedule::Schedule;
pub use stampede_core as core;

pub mod prelude {
    pub use crate::run::LoadTest;
    pub use crate::report::RunReport;
    pub use stampede_core::{Check, Ramp, RunConfig, Stage};
}
