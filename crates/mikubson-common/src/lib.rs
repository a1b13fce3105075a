pub mod error;
pub mod types;
pub mod config;

pub use config::CodecConfig;
pub use error::{CommonError, CommonResult};
pub use types::*;
