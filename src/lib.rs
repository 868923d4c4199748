pub mod config;
pub mod host;
pub mod logging;
pub mod scripting;
pub mod scripts;
