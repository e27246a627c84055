//! # Protocol Output Recipes
//!
//! Maps every supported external module protocol to the timer channel setup
//! it needs. Two recipes exist per protocol:
//!
//! - [`Protocol::start_config`] is applied once when the module is started
//!   and fully programs the output compare channel.
//! - [`Protocol::frame_config`] is applied before every DMA transfer and only
//!   touches the fields the protocol reprograms per frame.
//!
//! | Protocol | Output mode | Polarity | Initial compare |
//! |----------|-------------|----------|-----------------|
//! | PPM | PWM1 | caller flag (true = active low) | delay × 2 |
//! | PXX1 | PWM1 | active low | 9 µs × 2 |
//! | CRSF | toggle | active high | 0 |
//! | AFHDS3 | toggle (serial start) | active high | 0 |
//! | Soft-serial 100k | toggle (serial start) | active high | 0 |
//!
//! All values are in the 2 MHz timer tick domain.

use serde::Deserialize;

/// Pulse timer tick rate (2 MHz, 0.5 µs per tick)
pub const PULSE_TIMER_TICK_HZ: u32 = 2_000_000;

/// PXX1 fixed pulse width in microseconds
pub const PXX1_PULSE_US: u16 = 9;

/// Convert microseconds into pulse timer ticks
pub const fn us_to_ticks(us: u16) -> u32 {
    us as u32 * (PULSE_TIMER_TICK_HZ / 1_000_000)
}

/// Output compare mode of the timer channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Active while counter < compare, then inactive
    Pwm1,
    /// Output toggles on every compare match
    Toggle,
    /// Output held at its inactive level regardless of the counter
    ForcedInactive,
}

/// Output polarity of the timer channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    ActiveHigh,
    ActiveLow,
}

/// Complete output setup applied when a protocol is started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolConfig {
    pub mode: OutputMode,
    pub polarity: Polarity,
    pub compare: u32,
}

/// Per-frame reprogramming. `None` leaves the field as previously configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameConfig {
    pub mode: Option<OutputMode>,
    pub polarity: Option<Polarity>,
    pub compare: Option<u32>,
}

/// Protocol variant without parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolKind {
    Ppm,
    Pxx1,
    Crsf,
    Afhds3,
    #[serde(rename = "soft_serial_100k")]
    SoftSerial100k,
}

/// Protocol selector with the parameters its recipes depend on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// PPM with the given inter-pulse delay; `polarity = true` drives active low
    Ppm { delay_us: u16, polarity: bool },
    Pxx1,
    Crsf,
    /// AFHDS3 DMA bursts on top of the serial setup
    Afhds3,
    /// 100 kbit soft serial; `polarity = true` drives active high
    SoftSerial100k { polarity: bool },
}

/// Serial recipe shared by CRSF, AFHDS3 and soft-serial starts
const SERIAL_START: ProtocolConfig = ProtocolConfig {
    mode: OutputMode::Toggle,
    polarity: Polarity::ActiveHigh,
    compare: 0,
};

impl Protocol {
    /// Parameterless variant of this protocol
    pub fn kind(&self) -> ProtocolKind {
        match self {
            Protocol::Ppm { .. } => ProtocolKind::Ppm,
            Protocol::Pxx1 => ProtocolKind::Pxx1,
            Protocol::Crsf => ProtocolKind::Crsf,
            Protocol::Afhds3 => ProtocolKind::Afhds3,
            Protocol::SoftSerial100k { .. } => ProtocolKind::SoftSerial100k,
        }
    }

    /// Output setup applied once by `start`
    ///
    /// # Examples
    ///
    /// ```
    /// use extmodule_pulses::pulses::protocol::{OutputMode, Polarity, Protocol};
    ///
    /// let config = Protocol::Ppm { delay_us: 300, polarity: true }.start_config();
    /// assert_eq!(config.mode, OutputMode::Pwm1);
    /// assert_eq!(config.polarity, Polarity::ActiveLow);
    /// assert_eq!(config.compare, 600);
    /// ```
    pub fn start_config(&self) -> ProtocolConfig {
        match *self {
            Protocol::Ppm { delay_us, polarity } => ProtocolConfig {
                mode: OutputMode::Pwm1,
                polarity: ppm_polarity(polarity),
                compare: us_to_ticks(delay_us),
            },
            Protocol::Pxx1 => ProtocolConfig {
                mode: OutputMode::Pwm1,
                polarity: Polarity::ActiveLow,
                compare: us_to_ticks(PXX1_PULSE_US),
            },
            Protocol::Crsf | Protocol::Afhds3 | Protocol::SoftSerial100k { .. } => SERIAL_START,
        }
    }

    /// Reprogramming applied before every accepted frame
    ///
    /// Every recipe that names a mode also undoes the forced-inactive state
    /// left behind by the previous transfer's shutdown.
    pub fn frame_config(&self) -> FrameConfig {
        match *self {
            Protocol::Ppm { delay_us, polarity } => FrameConfig {
                mode: Some(OutputMode::Pwm1),
                polarity: Some(ppm_polarity(polarity)),
                compare: Some(us_to_ticks(delay_us)),
            },
            Protocol::Pxx1 => FrameConfig {
                mode: Some(OutputMode::Pwm1),
                polarity: None,
                compare: Some(us_to_ticks(PXX1_PULSE_US)),
            },
            Protocol::Crsf => FrameConfig {
                mode: Some(OutputMode::Toggle),
                polarity: Some(Polarity::ActiveHigh),
                compare: None,
            },
            Protocol::Afhds3 => FrameConfig::default(),
            Protocol::SoftSerial100k { polarity } => FrameConfig {
                mode: Some(OutputMode::Toggle),
                polarity: Some(if polarity {
                    Polarity::ActiveHigh
                } else {
                    Polarity::ActiveLow
                }),
                compare: None,
            },
        }
    }
}

// PPM flag is "inverted output": set means idle high, pulses low.
fn ppm_polarity(polarity: bool) -> Polarity {
    if polarity {
        Polarity::ActiveLow
    } else {
        Polarity::ActiveHigh
    }
}
