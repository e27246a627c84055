//! # Bit-Banged Inverted Serial
//!
//! Delay based byte sending at 57600 bit/s for module variants whose signal
//! pin has no usable timer channel.
//!
//! Frame format, inverted logic, LSB first:
//!
//! ```text
//! start  d0  d1  d2  d3  d4  d5  d6  d7  stop
//! high   !b0 !b1 !b2 !b3 !b4 !b5 !b6 !b7 low
//! 34     35  35  35  35  35  35  35  35  34   ticks @ 2 MHz
//! ```
//!
//! Interrupts are suspended from the start bit until the stop level has been
//! driven. The stop bit is timed out with interrupts enabled again since
//! nothing after it depends on sub-microsecond precision.

use crate::hal::BitBangPort;

/// Start bit length in 2 MHz ticks
pub const START_BIT_TICKS: u16 = 34;

/// Data bit length in 2 MHz ticks (≈ 57600 bit/s)
pub const DATA_BIT_TICKS: u16 = 35;

/// Minimum stop bit length in 2 MHz ticks
pub const STOP_BIT_TICKS: u16 = 34;

/// Start + 8 data + stop
pub const BIT_SLOTS: usize = 10;

/// Line level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    High,
    Low,
}

/// One bit cell on the line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitSlot {
    pub level: Level,
    pub ticks: u16,
}

/// Bit cells transmitted for `byte`, in line order
///
/// # Examples
///
/// ```
/// use extmodule_pulses::pulses::bitbang::{inverted_byte_levels, Level};
///
/// let slots = inverted_byte_levels(0x01);
/// assert_eq!(slots[0].level, Level::High); // start
/// assert_eq!(slots[1].level, Level::Low);  // bit 0 set => low
/// assert_eq!(slots[2].level, Level::High); // bit 1 clear => high
/// assert_eq!(slots[9].level, Level::Low);  // stop
/// ```
pub fn inverted_byte_levels(byte: u8) -> [BitSlot; BIT_SLOTS] {
    let mut slots = [BitSlot {
        level: Level::High,
        ticks: DATA_BIT_TICKS,
    }; BIT_SLOTS];

    slots[0].ticks = START_BIT_TICKS;

    for (bit, slot) in slots[1..=8].iter_mut().enumerate() {
        if byte & (1 << bit) != 0 {
            slot.level = Level::Low;
        }
    }

    slots[BIT_SLOTS - 1] = BitSlot {
        level: Level::Low,
        ticks: STOP_BIT_TICKS,
    };

    slots
}

/// Transmit one byte, blocking for the whole frame (174 µs nominal)
///
/// Each cell deadline is accumulated from the previous one rather than from
/// the moment the level was driven, so loop overhead does not drift the bit
/// clock. Must not be called with interrupts already disabled.
pub fn send_inverted_byte<P: BitBangPort + ?Sized>(port: &mut P, byte: u8) {
    let slots = inverted_byte_levels(byte);
    let (frame, stop) = slots.split_at(BIT_SLOTS - 1);
    let stop = stop[0];

    port.disable_interrupts();

    let mut deadline = port.ticks();
    for slot in frame {
        drive(port, slot.level);
        wait_ticks(port, deadline, slot.ticks);
        deadline = deadline.wrapping_add(slot.ticks);
    }

    drive(port, stop.level);
    port.enable_interrupts();

    wait_ticks(port, deadline, stop.ticks);
}

/// Transmit every byte of `bytes` back to back
pub fn send_inverted_bytes<P: BitBangPort + ?Sized>(port: &mut P, bytes: &[u8]) {
    for &byte in bytes {
        send_inverted_byte(port, byte);
    }
}

fn drive<P: BitBangPort + ?Sized>(port: &mut P, level: Level) {
    match level {
        Level::High => port.set_high(),
        Level::Low => port.set_low(),
    }
}

// 16-bit wrapping difference keeps this correct across counter overflow.
fn wait_ticks<P: BitBangPort + ?Sized>(port: &mut P, since: u16, ticks: u16) {
    while port.ticks().wrapping_sub(since) < ticks {
        std::hint::spin_loop();
    }
}
