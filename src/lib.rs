//! # Extmodule Pulses Library
//!
//! Pulse output driver for an external RF module bay.
//!
//! This library drives the single timer channel + DMA stream + GPIO pin that
//! carries the RC link waveform to the module. It arbitrates which protocol
//! (PPM, PXX1, CRSF, AFHDS3, 100 kbit soft serial) owns the resource, returns
//! the pin to a clean rest level after every frame, and provides a bit-banged
//! inverted serial fallback.

pub mod config;
pub mod error;
pub mod frames;
pub mod hal;
pub mod pulses;
pub mod service;
