//! # External Module Pulse Driver
//!
//! Owns the shared pulse timer and the module power line, and arbitrates
//! which protocol may drive them.
//!
//! ## Lifecycle
//!
//! ```text
//!            start()                 send_next_frame()
//! Stopped ───────────▶ Idle ─────────────────────────▶ Transmitting
//!    ▲                  ▲                                   │
//!    │ stop()           │ timer update IRQ                  │ DMA transfer-complete IRQ
//!    │ (any state)      │ (force inactive)                  ▼
//!    └──────────────────┴────────────────────────────── Stopping
//! ```
//!
//! Shutdown after a transfer takes two interrupts. When the DMA stream
//! completes, the last pulse period is already latched in the timer shadow
//! registers, so the handler only zeroes the compare value and enables the
//! update interrupt. The update handler then forces the output inactive, after
//! the last programmed pulse has finished and before the next one starts.
//!
//! Whether the timer can take a new frame is decided by the timer itself
//! ([`PulseTimer::stop_if_running`]); the driver keeps no busy flag of its own.

use tracing::{debug, info, trace, warn};

use crate::error::{ExtModuleError, Result};
use crate::hal::{ModulePower, PulseTimer};
use crate::pulses::protocol::{OutputMode, Protocol};

/// Driver lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// Module off, timer out of service
    Stopped,
    /// Timer configured, output at rest
    Idle,
    /// DMA transfer in flight
    Transmitting,
    /// Transfer done, waiting for the update event to force the output off
    Stopping,
}

/// Running counters, reset on every start
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverStats {
    pub frames_sent: u64,
    pub busy_rejections: u64,
    pub shutdowns_completed: u64,
}

/// Proof of ownership of a started module
///
/// Returned by [`PulseDriver::start`] and consumed by [`PulseDriver::stop`].
/// Not `Clone`, so only one caller can feed frames at a time.
#[derive(Debug)]
pub struct ModuleSession {
    protocol: Protocol,
    generation: u64,
}

impl ModuleSession {
    /// Protocol the module was started with
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }
}

/// Pulse driver for one external module bay
pub struct PulseDriver<T: PulseTimer, P: ModulePower> {
    timer: T,
    power: P,
    state: DriverState,
    generation: u64,
    stats: DriverStats,
}

impl<T: PulseTimer, P: ModulePower> std::fmt::Debug for PulseDriver<T, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PulseDriver")
            .field("state", &self.state)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl<T: PulseTimer, P: ModulePower> PulseDriver<T, P> {
    /// Create a stopped driver over the given timer and power line
    pub fn new(timer: T, power: P) -> Self {
        Self {
            timer,
            power,
            state: DriverState::Stopped,
            generation: 0,
            stats: DriverStats::default(),
        }
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn stats(&self) -> DriverStats {
        self.stats
    }

    /// Power the module and configure the timer for `protocol`
    ///
    /// # Errors
    ///
    /// Returns [`ExtModuleError::IllegalState`] unless the driver is stopped.
    /// Nothing is touched in that case.
    ///
    /// # Examples
    ///
    /// ```
    /// use extmodule_pulses::hal::sim::{SimModulePower, SimPulseTimer};
    /// use extmodule_pulses::pulses::driver::{DriverState, PulseDriver};
    /// use extmodule_pulses::pulses::protocol::Protocol;
    ///
    /// let mut driver = PulseDriver::new(SimPulseTimer::new(), SimModulePower::new());
    /// let session = driver.start(Protocol::Pxx1)?;
    /// assert_eq!(driver.state(), DriverState::Idle);
    /// driver.stop(session);
    /// # Ok::<(), extmodule_pulses::error::ExtModuleError>(())
    /// ```
    pub fn start(&mut self, protocol: Protocol) -> Result<ModuleSession> {
        if self.state != DriverState::Stopped {
            warn!("start({:?}) while driver is {:?}", protocol.kind(), self.state);
            return Err(ExtModuleError::IllegalState {
                operation: "start",
                state: self.state,
            });
        }

        let config = protocol.start_config();

        self.power.module_on();
        self.timer.init();
        self.timer.config_output(&config);

        self.generation += 1;
        self.stats = DriverStats::default();
        self.state = DriverState::Idle;

        info!(
            "External module started: {:?} (mode {:?}, polarity {:?}, compare {})",
            protocol, config.mode, config.polarity, config.compare
        );

        Ok(ModuleSession {
            protocol,
            generation: self.generation,
        })
    }

    /// Hand the next pulse buffer to the DMA stream
    ///
    /// `protocol` carries the per-frame parameters and must be the same
    /// variant the session was started with. The buffer is only read during
    /// this call.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - Frame accepted, transfer started
    /// * `Ok(false)` - Previous transfer still in flight, or empty buffer;
    ///   nothing was changed and the caller decides whether to retry
    ///
    /// # Errors
    ///
    /// - [`ExtModuleError::IllegalState`] if the driver is stopped or the
    ///   session belongs to an earlier start
    /// - [`ExtModuleError::ProtocolMismatch`] if `protocol` is another variant
    pub fn send_next_frame(
        &mut self,
        session: &ModuleSession,
        pulses: &[u16],
        protocol: Protocol,
    ) -> Result<bool> {
        if self.state == DriverState::Stopped || session.generation != self.generation {
            warn!("send_next_frame with a stale session (driver {:?})", self.state);
            return Err(ExtModuleError::IllegalState {
                operation: "send_next_frame",
                state: self.state,
            });
        }

        if protocol.kind() != session.protocol.kind() {
            return Err(ExtModuleError::ProtocolMismatch {
                session: session.protocol.kind(),
                frame: protocol.kind(),
            });
        }

        if pulses.is_empty() {
            debug!("Empty pulse buffer rejected");
            return Ok(false);
        }

        if !self.timer.stop_if_running() {
            self.stats.busy_rejections += 1;
            debug!("Frame rejected, previous transfer still in flight");
            return Ok(false);
        }

        let frame = protocol.frame_config();
        if let Some(compare) = frame.compare {
            self.timer.set_compare(compare);
        }
        if let Some(polarity) = frame.polarity {
            self.timer.set_polarity(polarity);
        }

        // A shutdown still waiting for its update event must not force the
        // output off in the middle of this transfer.
        self.timer.disable_update_interrupt();
        self.timer.clear_update();

        if let Some(mode) = frame.mode {
            self.timer.set_output_mode(mode);
        }

        self.timer.start_dma(pulses);

        self.state = DriverState::Transmitting;
        self.stats.frames_sent += 1;
        debug!("Frame {} started ({} pulses)", self.stats.frames_sent, pulses.len());

        Ok(true)
    }

    /// DMA transfer-complete interrupt entry point
    pub fn on_dma_transfer_complete(&mut self) {
        if !self.timer.dma_transfer_complete() {
            trace!("DMA interrupt without transfer-complete flag");
            return;
        }

        self.timer.clear_dma_transfer_complete();

        if self.state != DriverState::Transmitting {
            trace!("Transfer-complete while {:?} ignored", self.state);
            return;
        }

        self.timer.clear_update();
        self.timer.enable_update_interrupt();

        self.timer.set_compare(0);
        self.timer.set_output_mode(OutputMode::Pwm1);

        self.state = DriverState::Stopping;
        debug!("Transfer complete, output stops on next update");
    }

    /// Timer update interrupt entry point
    pub fn on_timer_update(&mut self) {
        if !self.timer.update_pending() {
            trace!("Timer interrupt without update flag");
            return;
        }

        self.timer.clear_update();
        self.timer.disable_update_interrupt();

        if self.state != DriverState::Stopping {
            trace!("Update event while {:?} ignored", self.state);
            return;
        }

        // Halt pulses and force to inactive level
        self.timer.set_output_mode(OutputMode::ForcedInactive);

        self.state = DriverState::Idle;
        self.stats.shutdowns_completed += 1;
        debug!("Output forced inactive");
    }

    /// Power the module off and release the timer, consuming the session
    ///
    /// Safe from any state, including mid-transfer; an in-flight transfer is
    /// cut short.
    pub fn stop(&mut self, _session: ModuleSession) {
        self.shutdown();
    }

    /// Same teardown as [`PulseDriver::stop`] without a session token
    pub fn shutdown(&mut self) {
        if self.state != DriverState::Stopped {
            info!(
                "External module stopped from {:?} after {} frames",
                self.state, self.stats.frames_sent
            );
        }

        self.power.module_off();
        self.timer.deinit();
        self.state = DriverState::Stopped;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::sim::{SimModulePower, SimPulseTimer};
    use crate::hal::traits::{MockModulePower, MockPulseTimer};
    use crate::pulses::protocol::{Polarity, ProtocolConfig};
    use mockall::predicate::eq;
    use mockall::Sequence;

    const PPM: Protocol = Protocol::Ppm {
        delay_us: 300,
        polarity: false,
    };

    fn all_protocols() -> [Protocol; 5] {
        [
            PPM,
            Protocol::Pxx1,
            Protocol::Crsf,
            Protocol::Afhds3,
            Protocol::SoftSerial100k { polarity: true },
        ]
    }

    fn sim_driver() -> (
        PulseDriver<SimPulseTimer, SimModulePower>,
        SimPulseTimer,
        SimModulePower,
    ) {
        let timer = SimPulseTimer::new();
        let power = SimModulePower::new();
        (PulseDriver::new(timer.clone(), power.clone()), timer, power)
    }

    /// Complete the in-flight transfer and deliver both interrupts
    fn complete_transfer(
        driver: &mut PulseDriver<SimPulseTimer, SimModulePower>,
        timer: &SimPulseTimer,
    ) {
        assert!(timer.finish_transfer());
        driver.on_dma_transfer_complete();
        assert!(timer.raise_update());
        driver.on_timer_update();
    }

    #[test]
    fn test_start_powers_on_then_configures() {
        let mut timer = MockPulseTimer::new();
        let mut power = MockModulePower::new();
        let mut seq = Sequence::new();

        power.expect_module_on().times(1).in_sequence(&mut seq).return_const(());
        timer.expect_init().times(1).in_sequence(&mut seq).return_const(());
        timer
            .expect_config_output()
            .withf(|c| {
                *c == ProtocolConfig {
                    mode: OutputMode::Pwm1,
                    polarity: Polarity::ActiveLow,
                    compare: 18,
                }
            })
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());

        let mut driver = PulseDriver::new(timer, power);
        let session = driver.start(Protocol::Pxx1).unwrap();
        assert_eq!(session.protocol(), Protocol::Pxx1);
        assert_eq!(driver.state(), DriverState::Idle);
    }

    #[test]
    fn test_start_twice_is_illegal() {
        let (mut driver, _timer, _power) = sim_driver();
        let _session = driver.start(PPM).unwrap();

        match driver.start(Protocol::Crsf) {
            Err(ExtModuleError::IllegalState { operation, state }) => {
                assert_eq!(operation, "start");
                assert_eq!(state, DriverState::Idle);
            }
            other => panic!("Expected IllegalState, got: {:?}", other),
        }
    }

    #[test]
    fn test_start_then_stop_leaves_everything_off() {
        for protocol in all_protocols() {
            let (mut driver, timer, power) = sim_driver();

            let session = driver.start(protocol).unwrap();
            assert!(power.is_on());
            assert!(timer.registers().initialized);

            driver.stop(session);
            let regs = timer.registers();
            assert_eq!(driver.state(), DriverState::Stopped, "{:?}", protocol);
            assert!(!power.is_on());
            assert!(!regs.initialized);
            assert!(!regs.update_interrupt);
        }
    }

    #[test]
    fn test_ppm_frame_reprograms_output() {
        let mut timer = MockPulseTimer::new();
        let mut power = MockModulePower::new();
        let mut seq = Sequence::new();

        power.expect_module_on().return_const(());
        timer.expect_init().return_const(());
        timer.expect_config_output().return_const(());

        timer.expect_stop_if_running().times(1).in_sequence(&mut seq).return_const(true);
        timer.expect_set_compare().with(eq(800)).times(1).in_sequence(&mut seq).return_const(());
        timer
            .expect_set_polarity()
            .with(eq(Polarity::ActiveLow))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        timer.expect_disable_update_interrupt().times(1).in_sequence(&mut seq).return_const(());
        timer.expect_clear_update().times(1).in_sequence(&mut seq).return_const(());
        timer
            .expect_set_output_mode()
            .with(eq(OutputMode::Pwm1))
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        timer
            .expect_start_dma()
            .withf(|pulses| pulses.to_vec() == vec![600u16, 3000, 3000])
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());

        let mut driver = PulseDriver::new(timer, power);
        let session = driver.start(PPM).unwrap();
        let frame_protocol = Protocol::Ppm { delay_us: 400, polarity: true };

        assert!(driver.send_next_frame(&session, &[600, 3000, 3000], frame_protocol).unwrap());
        assert_eq!(driver.state(), DriverState::Transmitting);
    }

    #[test]
    fn test_afhds3_frame_only_arms_dma() {
        let mut timer = MockPulseTimer::new();
        let mut power = MockModulePower::new();

        power.expect_module_on().return_const(());
        timer.expect_init().return_const(());
        timer.expect_config_output().return_const(());
        timer.expect_stop_if_running().return_const(true);
        timer.expect_disable_update_interrupt().return_const(());
        timer.expect_clear_update().return_const(());
        timer.expect_set_compare().never();
        timer.expect_set_polarity().never();
        timer.expect_set_output_mode().never();
        timer.expect_start_dma().times(1).return_const(());

        let mut driver = PulseDriver::new(timer, power);
        let session = driver.start(Protocol::Afhds3).unwrap();
        assert!(driver.send_next_frame(&session, &[1, 2], Protocol::Afhds3).unwrap());
    }

    #[test]
    fn test_busy_timer_rejects_without_touching_output() {
        let mut timer = MockPulseTimer::new();
        let mut power = MockModulePower::new();

        power.expect_module_on().return_const(());
        timer.expect_init().return_const(());
        timer.expect_config_output().return_const(());
        timer.expect_stop_if_running().times(1).return_const(false);
        timer.expect_set_compare().never();
        timer.expect_set_output_mode().never();
        timer.expect_start_dma().never();

        let mut driver = PulseDriver::new(timer, power);
        let session = driver.start(Protocol::Pxx1).unwrap();

        assert!(!driver.send_next_frame(&session, &[1], Protocol::Pxx1).unwrap());
        assert_eq!(driver.stats().busy_rejections, 1);
        assert_eq!(driver.state(), DriverState::Idle);
    }

    #[test]
    fn test_second_frame_before_completion_is_rejected() {
        for protocol in all_protocols() {
            let (mut driver, timer, _power) = sim_driver();
            let session = driver.start(protocol).unwrap();

            assert!(driver.send_next_frame(&session, &[10, 20, 30], protocol).unwrap());
            assert!(!driver.send_next_frame(&session, &[40], protocol).unwrap());
            assert!(!driver.send_next_frame(&session, &[40], protocol).unwrap());

            let regs = timer.registers();
            assert_eq!(regs.dma_in_flight, Some(vec![10, 20, 30]), "{:?}", protocol);
            assert_eq!(regs.transfers_started, 1);
            assert_eq!(driver.stats().frames_sent, 1);
            assert_eq!(driver.stats().busy_rejections, 2);
        }
    }

    #[test]
    fn test_empty_buffer_rejected() {
        let (mut driver, timer, _power) = sim_driver();
        let session = driver.start(Protocol::Crsf).unwrap();

        assert!(!driver.send_next_frame(&session, &[], Protocol::Crsf).unwrap());
        assert_eq!(timer.registers().transfers_started, 0);
        assert_eq!(driver.state(), DriverState::Idle);
    }

    #[test]
    fn test_send_before_start_is_illegal() {
        let (mut driver, _timer, _power) = sim_driver();
        let session = driver.start(Protocol::Pxx1).unwrap();
        driver.shutdown();

        let result = driver.send_next_frame(&session, &[1], Protocol::Pxx1);
        assert!(matches!(
            result,
            Err(ExtModuleError::IllegalState { state: DriverState::Stopped, .. })
        ));
    }

    #[test]
    fn test_stale_session_rejected_after_restart() {
        let (mut driver, _timer, _power) = sim_driver();
        let stale = driver.start(Protocol::Pxx1).unwrap();
        driver.shutdown();
        let _fresh = driver.start(Protocol::Pxx1).unwrap();

        let result = driver.send_next_frame(&stale, &[1], Protocol::Pxx1);
        assert!(matches!(result, Err(ExtModuleError::IllegalState { .. })));
    }

    #[test]
    fn test_protocol_mismatch() {
        let (mut driver, _timer, _power) = sim_driver();
        let session = driver.start(PPM).unwrap();

        match driver.send_next_frame(&session, &[1], Protocol::Pxx1) {
            Err(ExtModuleError::ProtocolMismatch { session, frame }) => {
                assert_eq!(session, PPM.kind());
                assert_eq!(frame, Protocol::Pxx1.kind());
            }
            other => panic!("Expected ProtocolMismatch, got: {:?}", other),
        }
    }

    #[test]
    fn test_two_interrupt_shutdown_sequence() {
        let (mut driver, timer, _power) = sim_driver();
        let session = driver.start(PPM).unwrap();
        assert!(driver.send_next_frame(&session, &[600, 3000], PPM).unwrap());

        assert!(timer.finish_transfer());
        driver.on_dma_transfer_complete();
        let regs = timer.registers();
        assert_eq!(driver.state(), DriverState::Stopping);
        assert_eq!(regs.compare, 0);
        assert_eq!(regs.mode, OutputMode::Pwm1);
        assert!(regs.update_interrupt);
        assert!(!regs.dma_tc_flag);

        assert!(timer.raise_update());
        driver.on_timer_update();
        let regs = timer.registers();
        assert_eq!(driver.state(), DriverState::Idle);
        assert_eq!(regs.mode, OutputMode::ForcedInactive);
        assert!(!regs.update_interrupt);
        assert!(!regs.update_flag);
        assert_eq!(driver.stats().shutdowns_completed, 1);
    }

    #[test]
    fn test_next_frame_undoes_forced_inactive() {
        let (mut driver, timer, _power) = sim_driver();
        let protocol = Protocol::SoftSerial100k { polarity: false };
        let session = driver.start(protocol).unwrap();

        assert!(driver.send_next_frame(&session, &[20, 20], protocol).unwrap());
        complete_transfer(&mut driver, &timer);
        assert_eq!(timer.registers().mode, OutputMode::ForcedInactive);

        assert!(driver.send_next_frame(&session, &[20, 20], protocol).unwrap());
        let regs = timer.registers();
        assert_eq!(regs.mode, OutputMode::Toggle);
        assert_eq!(regs.polarity, Polarity::ActiveLow);
        assert_eq!(driver.state(), DriverState::Transmitting);
    }

    #[test]
    fn test_frame_during_stopping_cancels_pending_shutdown() {
        let (mut driver, timer, _power) = sim_driver();
        let session = driver.start(Protocol::Pxx1).unwrap();

        assert!(driver.send_next_frame(&session, &[1], Protocol::Pxx1).unwrap());
        assert!(timer.finish_transfer());
        driver.on_dma_transfer_complete();
        assert_eq!(driver.state(), DriverState::Stopping);

        assert!(driver.send_next_frame(&session, &[2], Protocol::Pxx1).unwrap());
        assert!(!timer.registers().update_interrupt);

        // an update on a shared line now must not kill the new transfer
        assert!(!timer.raise_update());
        driver.on_timer_update();
        assert_eq!(timer.registers().mode, OutputMode::Pwm1);
        assert_eq!(driver.state(), DriverState::Transmitting);
    }

    #[test]
    fn test_frame_rejected_while_transfer_complete_pending() {
        let (mut driver, timer, _power) = sim_driver();
        let session = driver.start(Protocol::Pxx1).unwrap();

        assert!(driver.send_next_frame(&session, &[1, 2], Protocol::Pxx1).unwrap());
        assert!(timer.finish_transfer());

        // completion handler has not run yet
        assert!(!driver.send_next_frame(&session, &[3, 4], Protocol::Pxx1).unwrap());
        assert_eq!(driver.stats().busy_rejections, 1);
        assert_eq!(timer.registers().dma_in_flight, None);

        driver.on_dma_transfer_complete();
        assert_eq!(driver.state(), DriverState::Stopping);
        assert!(driver.send_next_frame(&session, &[3, 4], Protocol::Pxx1).unwrap());

        let regs = timer.registers();
        assert_eq!(regs.dma_in_flight, Some(vec![3, 4]));
        assert_eq!(regs.mode, OutputMode::Pwm1);
        assert!(!regs.update_interrupt);
        assert_eq!(driver.state(), DriverState::Transmitting);
    }

    #[test]
    fn test_stale_transfer_complete_leaves_new_frame_alone() {
        let mut timer = MockPulseTimer::new();
        let mut power = MockModulePower::new();

        power.expect_module_on().return_const(());
        timer.expect_init().return_const(());
        timer.expect_config_output().return_const(());
        timer.expect_dma_transfer_complete().times(1).return_const(true);
        timer.expect_clear_dma_transfer_complete().times(1).return_const(());
        timer.expect_enable_update_interrupt().never();
        timer.expect_set_compare().never();
        timer.expect_set_output_mode().never();

        let mut driver = PulseDriver::new(timer, power);
        let _session = driver.start(Protocol::Pxx1).unwrap();

        driver.on_dma_transfer_complete();
        assert_eq!(driver.state(), DriverState::Idle);
    }

    #[test]
    fn test_update_flag_always_serviced() {
        let (mut driver, timer, _power) = sim_driver();
        let session = driver.start(Protocol::Crsf).unwrap();
        assert!(driver.send_next_frame(&session, &[5, 5], Protocol::Crsf).unwrap());

        let mut line = timer.clone();
        line.enable_update_interrupt();
        assert!(timer.raise_update());
        driver.on_timer_update();

        let regs = timer.registers();
        assert!(!regs.update_flag);
        assert!(!regs.update_interrupt);
        assert_eq!(regs.mode, OutputMode::Toggle);
        assert_eq!(driver.state(), DriverState::Transmitting);
        assert_eq!(driver.stats().shutdowns_completed, 0);
    }

    #[test]
    fn test_spurious_interrupts_are_ignored() {
        let (mut driver, timer, _power) = sim_driver();
        let session = driver.start(PPM).unwrap();
        assert!(driver.send_next_frame(&session, &[600], PPM).unwrap());

        driver.on_dma_transfer_complete();
        driver.on_timer_update();

        let regs = timer.registers();
        assert_eq!(driver.state(), DriverState::Transmitting);
        assert_eq!(regs.compare, 600);
        assert!(!regs.update_interrupt);
    }

    #[test]
    fn test_repeated_update_after_shutdown_is_harmless() {
        let (mut driver, timer, _power) = sim_driver();
        let session = driver.start(Protocol::Crsf).unwrap();
        assert!(driver.send_next_frame(&session, &[5, 5], Protocol::Crsf).unwrap());
        complete_transfer(&mut driver, &timer);

        timer.raise_update();
        driver.on_timer_update();
        let regs = timer.registers();
        assert_eq!(driver.state(), DriverState::Idle);
        assert_eq!(regs.mode, OutputMode::ForcedInactive);
        assert!(!regs.update_flag);
        assert!(!regs.update_interrupt);
        assert_eq!(driver.stats().shutdowns_completed, 1);
    }

    #[test]
    fn test_stop_mid_transfer() {
        let (mut driver, timer, power) = sim_driver();
        let session = driver.start(PPM).unwrap();
        assert!(driver.send_next_frame(&session, &[600, 3000, 3000], PPM).unwrap());

        driver.stop(session);

        let regs = timer.registers();
        assert_eq!(driver.state(), DriverState::Stopped);
        assert!(!power.is_on());
        assert!(!regs.initialized);
        assert_eq!(regs.dma_in_flight, None);
        assert!(!regs.update_interrupt);
    }

    #[test]
    fn test_stop_while_stopping() {
        let (mut driver, timer, power) = sim_driver();
        let session = driver.start(Protocol::Pxx1).unwrap();
        assert!(driver.send_next_frame(&session, &[1], Protocol::Pxx1).unwrap());
        assert!(timer.finish_transfer());
        driver.on_dma_transfer_complete();

        driver.stop(session);
        assert_eq!(driver.state(), DriverState::Stopped);
        assert!(!timer.registers().update_interrupt);
        assert!(!power.is_on());
    }

    #[test]
    fn test_shutdown_when_stopped_is_safe() {
        let (mut driver, timer, power) = sim_driver();
        driver.shutdown();
        driver.shutdown();
        assert_eq!(driver.state(), DriverState::Stopped);
        assert!(!power.is_on());
        assert!(!timer.registers().initialized);
    }

    #[test]
    fn test_restart_with_other_protocol() {
        let (mut driver, timer, _power) = sim_driver();
        let session = driver.start(PPM).unwrap();
        assert!(driver.send_next_frame(&session, &[1], PPM).unwrap());
        driver.stop(session);

        let session = driver.start(Protocol::Crsf).unwrap();
        let regs = timer.registers();
        assert_eq!(regs.mode, OutputMode::Toggle);
        assert_eq!(regs.compare, 0);
        assert_eq!(driver.stats(), DriverStats::default());
        assert!(driver.send_next_frame(&session, &[1], Protocol::Crsf).unwrap());
    }

    #[test]
    fn test_many_frames() {
        let (mut driver, timer, _power) = sim_driver();
        let session = driver.start(Protocol::Pxx1).unwrap();

        for i in 0..10u16 {
            assert!(driver.send_next_frame(&session, &[i + 1; 4], Protocol::Pxx1).unwrap());
            complete_transfer(&mut driver, &timer);
        }

        let stats = driver.stats();
        assert_eq!(stats.frames_sent, 10);
        assert_eq!(stats.shutdowns_completed, 10);
        assert_eq!(stats.busy_rejections, 0);
        assert_eq!(timer.registers().transfers_started, 10);
    }
}
