pub mod clock;
pub mod config;
pub mod duration;
pub mod error;
pub mod job;
pub mod models;
pub mod pipeline;
pub mod portal;
pub mod session;
#[cfg(feature = "sheets")]
pub mod sheets;

pub use error::{Error, Result};
