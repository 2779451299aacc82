pub mod plan;
pub mod proposal;
