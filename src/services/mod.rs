pub mod archive;
pub mod bugreport;
pub mod config;
pub mod device;
pub mod fs_utils;
pub mod run;
