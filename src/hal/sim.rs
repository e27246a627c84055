//! Software-simulated pulse hardware
//!
//! Stands in for the timer/DMA/GPIO triple on hosts without one. Register
//! state lives behind `Arc<Mutex<_>>` so a clone kept by the caller can still
//! inspect it, and drive the interrupt flags, once the driver owns its own
//! clone.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::traits::{BitBangPort, ModulePower, PulseTimer};
use crate::pulses::protocol::{OutputMode, Polarity, ProtocolConfig};

/// Snapshot of the simulated timer channel registers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerRegisters {
    pub initialized: bool,
    pub counting: bool,
    pub mode: OutputMode,
    pub polarity: Polarity,
    pub compare: u32,
    /// Buffer of the transfer currently owned by the DMA stream
    pub dma_in_flight: Option<Vec<u16>>,
    pub dma_tc_flag: bool,
    pub update_flag: bool,
    pub update_interrupt: bool,
    pub transfers_started: u64,
}

impl Default for TimerRegisters {
    fn default() -> Self {
        Self {
            initialized: false,
            counting: false,
            mode: OutputMode::ForcedInactive,
            polarity: Polarity::ActiveHigh,
            compare: 0,
            dma_in_flight: None,
            dma_tc_flag: false,
            update_flag: false,
            update_interrupt: false,
            transfers_started: 0,
        }
    }
}

/// Simulated timer channel with DMA
#[derive(Debug, Clone, Default)]
pub struct SimPulseTimer {
    regs: Arc<Mutex<TimerRegisters>>,
}

impl SimPulseTimer {
    pub fn new() -> Self {
        Self::default()
    }

    fn regs(&self) -> MutexGuard<'_, TimerRegisters> {
        self.regs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current register state
    pub fn registers(&self) -> TimerRegisters {
        self.regs().clone()
    }

    /// Complete the in-flight DMA transfer and raise its transfer-complete flag
    ///
    /// Returns false if no transfer was in flight.
    pub fn finish_transfer(&self) -> bool {
        let mut regs = self.regs();
        if regs.dma_in_flight.take().is_none() {
            return false;
        }
        regs.dma_tc_flag = true;
        true
    }

    /// Raise the timer period update flag
    ///
    /// Returns whether the update interrupt is enabled, i.e. whether real
    /// hardware would now invoke the update handler.
    pub fn raise_update(&self) -> bool {
        let mut regs = self.regs();
        if !regs.counting {
            return false;
        }
        regs.update_flag = true;
        regs.update_interrupt
    }
}

impl PulseTimer for SimPulseTimer {
    fn init(&mut self) {
        let mut regs = self.regs();
        regs.initialized = true;
        regs.counting = false;
    }

    fn deinit(&mut self) {
        let mut regs = self.regs();
        let transfers_started = regs.transfers_started;
        *regs = TimerRegisters {
            transfers_started,
            ..TimerRegisters::default()
        };
    }

    fn config_output(&mut self, config: &ProtocolConfig) {
        let mut regs = self.regs();
        regs.mode = config.mode;
        regs.polarity = config.polarity;
        regs.compare = config.compare;
    }

    fn set_compare(&mut self, value: u32) {
        self.regs().compare = value;
    }

    fn set_polarity(&mut self, polarity: Polarity) {
        self.regs().polarity = polarity;
    }

    fn set_output_mode(&mut self, mode: OutputMode) {
        self.regs().mode = mode;
    }

    fn stop_if_running(&mut self) -> bool {
        let mut regs = self.regs();
        // A transfer stays busy until its completion interrupt is serviced
        if !regs.initialized || regs.dma_in_flight.is_some() || regs.dma_tc_flag {
            return false;
        }
        regs.counting = false;
        true
    }

    fn start_dma(&mut self, pulses: &[u16]) {
        let mut regs = self.regs();
        regs.dma_in_flight = Some(pulses.to_vec());
        regs.counting = true;
        regs.transfers_started += 1;
    }

    fn dma_transfer_complete(&self) -> bool {
        self.regs().dma_tc_flag
    }

    fn clear_dma_transfer_complete(&mut self) {
        self.regs().dma_tc_flag = false;
    }

    fn update_pending(&self) -> bool {
        self.regs().update_flag
    }

    fn clear_update(&mut self) {
        self.regs().update_flag = false;
    }

    fn enable_update_interrupt(&mut self) {
        self.regs().update_interrupt = true;
    }

    fn disable_update_interrupt(&mut self) {
        self.regs().update_interrupt = false;
    }
}

/// Simulated module power GPIO
#[derive(Debug, Clone, Default)]
pub struct SimModulePower {
    powered: Arc<AtomicBool>,
}

impl SimModulePower {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_on(&self) -> bool {
        self.powered.load(Ordering::SeqCst)
    }
}

impl ModulePower for SimModulePower {
    fn module_on(&mut self) {
        self.powered.store(true, Ordering::SeqCst);
    }

    fn module_off(&mut self) {
        self.powered.store(false, Ordering::SeqCst);
    }
}

/// Event recorded by [`SimBitBangPort`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEvent {
    High,
    Low,
    InterruptsDisabled,
    InterruptsEnabled,
}

/// Simulated bit-bang port
///
/// Every tick counter read advances simulated time by a fixed step, so busy
/// waits terminate. Events are stamped with the absolute (non-wrapping) tick.
#[derive(Debug, Clone)]
pub struct SimBitBangPort {
    counter: u16,
    elapsed: u64,
    step: u16,
    interrupts_enabled: bool,
    timeline: Vec<(u64, LineEvent)>,
}

impl SimBitBangPort {
    /// Port whose counter starts at `counter` and advances `step` ticks per read
    pub fn new(counter: u16, step: u16) -> Self {
        Self {
            counter,
            elapsed: 0,
            step: step.max(1),
            interrupts_enabled: true,
            timeline: Vec::new(),
        }
    }

    /// Recorded events in order
    pub fn timeline(&self) -> &[(u64, LineEvent)] {
        &self.timeline
    }

    /// Absolute ticks elapsed since creation
    pub fn elapsed(&self) -> u64 {
        self.elapsed
    }

    pub fn interrupts_enabled(&self) -> bool {
        self.interrupts_enabled
    }

    fn record(&mut self, event: LineEvent) {
        self.timeline.push((self.elapsed, event));
    }
}

impl BitBangPort for SimBitBangPort {
    fn ticks(&mut self) -> u16 {
        let now = self.counter;
        self.counter = self.counter.wrapping_add(self.step);
        self.elapsed += u64::from(self.step);
        now
    }

    fn set_high(&mut self) {
        self.record(LineEvent::High);
    }

    fn set_low(&mut self) {
        self.record(LineEvent::Low);
    }

    fn disable_interrupts(&mut self) {
        debug_assert!(self.interrupts_enabled, "interrupt gate nested");
        self.interrupts_enabled = false;
        self.record(LineEvent::InterruptsDisabled);
    }

    fn enable_interrupts(&mut self) {
        self.interrupts_enabled = true;
        self.record(LineEvent::InterruptsEnabled);
    }
}
