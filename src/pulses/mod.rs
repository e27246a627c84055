//! # Pulses Module
//!
//! Waveform generation towards the external RF module.
//!
//! This module handles:
//! - Per-protocol timer output recipes (PPM, PXX1, CRSF, AFHDS3, soft serial)
//! - Arbitration of the shared timer/DMA resource between start, frame and stop
//! - The two-interrupt shutdown that returns the pin to rest after each frame
//! - Bit-banged inverted serial when no timer channel is available

pub mod bitbang;
pub mod driver;
pub mod protocol;
