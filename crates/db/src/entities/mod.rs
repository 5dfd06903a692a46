//! Database entities.

pub mod job;

pub use job::Entity as Job;
