//! Job definitions.

mod generate;

pub use generate::GenerateContentJob;
