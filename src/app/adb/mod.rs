pub mod apps;
pub mod gate;
pub mod locator;
pub mod runner;
