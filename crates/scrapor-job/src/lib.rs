//! Job lifecycle management and persistence.
//!
//! The [`JobManager`] owns the job state machine: it persists a pending
//! job on submission, drives the workflow runner end-to-end, publishes
//! progress and partial results after every step, and finalizes the job
//! as completed, failed, or cancelled. The [`JobStore`] trait abstracts
//! the persistence backend; memory and file backends are provided.

/// The job lifecycle manager.
pub mod manager;
/// Job persistence backends.
pub mod store;

pub use manager::JobManager;
pub use store::{FileJobStore, JobStore, MemoryJobStore};
