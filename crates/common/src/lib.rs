//! # Paraprobe Common Crate
//!
//! Shared vocabulary for the paraprobe workspace.
//!
//! ## Modules
//! - `types`: address / hash / height newtypes with hex serde
//! - `time`: unix-time helpers
//! - `config`: TOML service configuration with env overrides
//! - `result`: test request / result / run-parameter records
//!
//! ## Usage
//! ```rust,ignore
//! let config = ServiceConfig::load_from_file("paraprobe.toml")?;
//! let target: Address = "0xd2a5bC10698FD955D1Fe6cb4a99047d3a1Fc7b83".parse()?;
//! ```

pub mod config;
pub mod result;
pub mod time;
pub mod types;

pub use config::ServiceConfig;
pub use result::{RunParams, TestRequest, TestResult};
pub use time::{now_millis, now_secs};
pub use types::{Address, BlockHeight, Hash32};
