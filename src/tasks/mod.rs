pub(crate) mod maintenance;
pub mod processing;
pub mod scheduler;
