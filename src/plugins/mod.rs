pub mod core;
pub mod input;
pub mod intel;
pub mod planner;
pub mod render2d;
pub mod saveload;
pub mod sync;
pub mod ui;
