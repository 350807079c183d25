//! Test harness for driving bitstream jobs through the platform.
//!
//! This module provides:
//! - [`BitstreamImage`], a builder for header-plus-payload images in host memory
//! - End-to-end scenarios that exercise the control plane through the host
//!   driver (compiled for tests only)
//!
//! # Usage
//!
//! ```ignore
//! let image = BitstreamImage::synthetic(0, 0x42, 256);
//! image.install(platform.memory_mut(), 0x1000_0000);
//! platform.host(100_000).load_bitstream(&image.load_job(0x1000_0000, 50_000))?;
//! ```

pub mod image;

#[cfg(test)]
mod scenarios;

pub use image::{payload_checksum, BitstreamImage};
