pub mod email;
pub mod plan;
pub mod report;
