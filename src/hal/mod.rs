//! # Hardware Abstraction Module
//!
//! Hardware the pulse driver runs on, expressed as traits.
//!
//! This module handles:
//! - The timer channel + DMA stream + GPIO pin driving the module signal line
//! - The external module power control line
//! - The GPIO pin, tick counter and interrupt gate used for bit-banged serial
//! - A simulated implementation of all three for hosts without the hardware

pub mod sim;
pub mod traits;

pub use traits::{BitBangPort, ModulePower, PulseTimer};
