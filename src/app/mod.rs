pub mod actions;
pub mod adb;
pub mod config;
pub mod error;
pub mod events;
pub mod launcher;
pub mod logging;
pub mod models;
pub mod store;
pub mod worker;
