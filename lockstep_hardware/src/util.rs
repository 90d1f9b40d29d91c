//! Register arithmetic for the PCA9685 PWM controller on the motor HAT.
//!
//! Kept free of I/O so it can be tested without the `hardware` feature.

/// Internal oscillator of the PCA9685.
pub const PCA9685_OSC_HZ: u32 = 25_000_000;
/// Counts per PWM period (12-bit).
pub const PWM_COUNTS: u32 = 4096;

pub const REG_MODE1: u8 = 0x00;
pub const REG_PRESCALE: u8 = 0xFE;
pub const REG_LED0_ON_L: u8 = 0x06;

/// MODE1 bits.
pub const MODE1_SLEEP: u8 = 0x10;
pub const MODE1_AUTO_INC: u8 = 0x20;
pub const MODE1_RESTART: u8 = 0x80;

/// Bit 12 of an ON/OFF register pair: channel fully on / fully off.
pub const FULL: u16 = 0x1000;

/// Prescale value for `pwm_hz`: round(osc / (4096 × hz)) - 1, clamped to 3..=255.
pub fn pca9685_prescale(pwm_hz: u32) -> u8 {
    let hz = u64::from(pwm_hz.max(1));
    let div = u64::from(PWM_COUNTS) * hz;
    let rounded = (u64::from(PCA9685_OSC_HZ) + div / 2) / div;
    let pre = rounded.saturating_sub(1).clamp(3, 255);
    u8::try_from(pre).unwrap_or(u8::MAX)
}

/// PWM duty in counts (0..=4095) for an output in thousandths.
pub fn duty_counts(milli: i32) -> u16 {
    let m = milli.unsigned_abs().min(1000);
    u16::try_from(m * (PWM_COUNTS - 1) / 1000).unwrap_or(u16::MAX)
}

/// H-bridge input levels (IN1, IN2): forward, reverse, or coast at zero.
pub const fn bridge_levels(milli: i32) -> (bool, bool) {
    if milli > 0 {
        (true, false)
    } else if milli < 0 {
        (false, true)
    } else {
        (false, false)
    }
}

/// First register of `channel`'s ON/OFF block.
pub const fn channel_register(channel: u8) -> u8 {
    REG_LED0_ON_L + 4 * channel
}

/// ON/OFF register bytes (little-endian) for a duty in counts.
pub fn channel_bytes(duty: u16) -> [u8; 4] {
    let (on, off) = match duty {
        0 => (0, FULL),
        d if u32::from(d) >= PWM_COUNTS - 1 => (FULL, 0),
        d => (0, d),
    };
    let [on_l, on_h] = on.to_le_bytes();
    let [off_l, off_h] = off.to_le_bytes();
    [on_l, on_h, off_l, off_h]
}
