//! Trait abstraction for the pulse timer, module power line and bit-bang pin

use crate::pulses::protocol::{OutputMode, Polarity, ProtocolConfig};

/// Timer channel + DMA stream + GPIO pin driving the module signal line
///
/// Implementations map each call onto register accesses; none of them block.
#[cfg_attr(test, mockall::automock)]
pub trait PulseTimer: Send {
    /// Bring the timer and DMA stream into service
    fn init(&mut self);

    /// Take the timer and DMA stream out of service, aborting any transfer
    fn deinit(&mut self);

    /// Program compare mode, polarity and compare value in one go
    fn config_output(&mut self, config: &ProtocolConfig);

    /// Update the running compare register
    fn set_compare(&mut self, value: u32);

    /// Update the channel output polarity
    fn set_polarity(&mut self, polarity: Polarity);

    /// Update the channel output compare mode
    fn set_output_mode(&mut self, mode: OutputMode);

    /// Returns false while a previous DMA transfer is still in flight or its
    /// transfer-complete flag is still pending, otherwise stops the timer and
    /// readies it for a new transfer
    fn stop_if_running(&mut self) -> bool;

    /// Arm a DMA burst from `pulses` tied to the timer update event and
    /// restart the timer. The data is consumed before this returns.
    fn start_dma(&mut self, pulses: &[u16]);

    /// DMA transfer-complete flag
    fn dma_transfer_complete(&self) -> bool;

    fn clear_dma_transfer_complete(&mut self);

    /// Timer period update flag
    fn update_pending(&self) -> bool;

    fn clear_update(&mut self);

    fn enable_update_interrupt(&mut self);

    fn disable_update_interrupt(&mut self);
}

/// External module power control line
#[cfg_attr(test, mockall::automock)]
pub trait ModulePower: Send {
    fn module_on(&mut self);

    fn module_off(&mut self);
}

/// GPIO pin, free-running tick counter and interrupt gate used by the
/// software serial transmitter
pub trait BitBangPort {
    /// Free-running 2 MHz tick counter, wraps at 16 bits
    fn ticks(&mut self) -> u16;

    fn set_high(&mut self);

    fn set_low(&mut self);

    /// Suspend all interrupts. Never nested.
    fn disable_interrupts(&mut self);

    fn enable_interrupts(&mut self);
}
