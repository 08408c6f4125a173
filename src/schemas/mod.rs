pub mod analysis;
pub mod coverage;
pub mod lesson;
