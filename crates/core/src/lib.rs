//! Core domain logic for taleforge.
//!
//! This crate owns the job lifecycle:
//!
//! - **Job model**: [`Job`], [`JobStatus`], [`JobType`] and the transition
//!   rules shared by every store implementation
//! - **Job store**: the [`JobStore`] contract plus an in-memory
//!   implementation for tests and local development
//! - **Providers**: capability traits for the external text/image/speech
//!   generators the pipeline calls
//! - **Progress**: the [`ProgressSink`] contract for best-effort status
//!   pushes
//! - **Job service**: create/query/cancel operations consumed by the API
//!   layer

pub mod job;
pub mod memory;
pub mod progress;
pub mod providers;
pub mod service;
pub mod store;

pub use job::{Job, JobPatch, JobStatus, JobType, StatusUpdate, TransitionPlan, plan_transition};
pub use memory::InMemoryJobStore;
pub use progress::{NullProgressSink, ProgressSink, ProgressUpdate};
pub use providers::{GenerationInput, GenerationResult, ImageGenerator, SpeechSynthesizer, TextGenerator};
pub use service::{CreateJobRequest, JobService, TaskDispatch};
pub use store::JobStore;
