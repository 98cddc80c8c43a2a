pub mod algorithms;
pub mod baseline;
pub mod cmd_exec;
pub mod config;
pub mod detection;
pub mod error;
pub mod file_ops;
pub mod flasher;
pub mod scan;
pub mod serialization;
pub mod snapshot;
