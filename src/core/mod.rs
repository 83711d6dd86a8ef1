pub mod boxes;
pub mod domain;
pub mod metadata;
pub mod pipeline;
pub mod scheduler;
pub mod traits;
