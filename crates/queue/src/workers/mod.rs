//! Worker functions executed by the apalis monitor.

mod generate;

pub use generate::{GenerateContext, StepPolicy, generate_worker, run_generation};
