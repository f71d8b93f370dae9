// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`processor`] defines the `Processor` contract and the static registry.
//! - [`interpreter`] holds the built-in `shell`, `bash` and `python`
//!   processors.
//! - [`log_follower`] tails process log files while they run.
//! - [`job`] runs a single job and checks its outputs.
//! - [`panic_trace`] attaches stack traces to panics inside jobs.
//! - [`executor_loop`] turns dispatched jobs into isolated worker tasks.
//! - [`backend`] provides the `ExecutorBackend` trait and the production
//!   `RealExecutorBackend`; tests replace it with a fake.

pub mod backend;
pub mod executor_loop;
pub mod interpreter;
pub mod job;
pub mod log_follower;
pub mod panic_trace;
pub mod processor;

pub use backend::{ExecutorBackend, RealExecutorBackend};
pub use executor_loop::spawn_executor;
pub use interpreter::InterpreterProcessor;
pub use job::{run_job, JobEnvironment};
pub use log_follower::LogFollower;
pub use panic_trace::PanicTrace;
pub use processor::{CancelSignal, ProcessExit, Processor, ProcessorRegistry, RunContext};
