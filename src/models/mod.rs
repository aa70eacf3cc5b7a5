pub mod analysis;
pub mod job;
pub mod plan;
pub mod product;
