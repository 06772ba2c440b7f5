//! Remote application platform access.

pub mod client;

pub use client::{PlatformClient, PlatformConfig, PlatformError};
