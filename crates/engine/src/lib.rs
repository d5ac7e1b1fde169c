pub mod tick;
pub mod world;
