pub mod registry;
pub mod sandbox;
