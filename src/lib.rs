// Library exports for the keeper process supervisor

pub mod cli;
pub mod config;
pub mod error;
pub mod history;
pub mod ipc;
pub mod logging;
pub mod process;
