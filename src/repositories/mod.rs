pub mod analyses;
pub mod coverage;
pub mod feedback;
pub mod jobs;
pub mod lessons;
pub mod objectives;
pub mod plans;
