//! # Demo Pulse Trains
//!
//! Pulse buffers fed to the driver by the binary. Real payload encoding
//! happens upstream of the driver; these only produce well-formed timing.
//!
//! Buffers hold timer period values in 2 MHz ticks, one entry per DMA
//! request.

use crate::pulses::protocol::{us_to_ticks, ProtocolKind};

/// Shortest PPM sync gap after the last channel
pub const PPM_MIN_SYNC_US: u64 = 4000;

/// Bit cell of the 100 kbit toggle protocols in microseconds
pub const SERIAL_100K_BIT_US: u16 = 10;

/// Build a PPM frame of `channels` equal pulses followed by the sync gap
///
/// The sync gap fills the rest of `frame_period_us`, saturating at the
/// largest period the 16-bit timer can hold.
///
/// # Examples
///
/// ```
/// use extmodule_pulses::frames::ppm_frame;
///
/// let frame = ppm_frame(8, 1500, 20_000);
/// assert_eq!(frame.len(), 9);
/// assert_eq!(frame[0], 3000);
/// assert_eq!(frame[8], 16_000);
/// ```
pub fn ppm_frame(channels: usize, pulse_us: u16, frame_period_us: u64) -> Vec<u16> {
    let mut frame = vec![period_ticks(pulse_us); channels];

    let used_us = channels as u64 * u64::from(pulse_us);
    let sync_us = frame_period_us.saturating_sub(used_us).max(PPM_MIN_SYNC_US);
    let sync_ticks = sync_us * u64::from(us_to_ticks(1));
    frame.push(u16::try_from(sync_ticks).unwrap_or(u16::MAX));

    frame
}

/// Timer period for `us`, saturating at the 16-bit register maximum
fn period_ticks(us: u16) -> u16 {
    u16::try_from(us_to_ticks(us)).unwrap_or(u16::MAX)
}

/// Fixed timing pattern for the non-PPM protocols
pub fn demo_pattern(kind: ProtocolKind) -> Vec<u16> {
    let bit = period_ticks(SERIAL_100K_BIT_US);
    match kind {
        ProtocolKind::Ppm => ppm_frame(8, 1500, 20_000),
        // PXX1 cells: 16 µs for a zero, 24 µs for a one
        ProtocolKind::Pxx1 => [period_ticks(16), period_ticks(24)].repeat(8),
        ProtocolKind::Crsf | ProtocolKind::SoftSerial100k => {
            // start bit, 0x55 data, parity, two stop bits as toggle intervals
            vec![bit, bit, bit, bit, bit, bit, bit, bit, bit, 3 * bit]
        }
        ProtocolKind::Afhds3 => vec![bit * 2; 16],
    }
}
