pub mod analyze;
pub mod assemble;
pub mod convert;
pub mod fetch;
pub mod orchestrator;
pub mod send;
pub mod synthesize;
