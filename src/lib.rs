pub mod config;
pub mod notify;
pub mod paths;
pub mod report;
pub mod screenshot;
pub mod session;
pub mod upload;
