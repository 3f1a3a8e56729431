pub mod algorithm;
pub mod config;
pub mod session_data;

pub use algorithm::*;
pub use config::*;
pub use session_data::*;
