//! These are low-level definitions for S2MF301 gauge block

use crate::fmt::bitflags;

/// Default 7-bit bus address of the gauge
pub const DEFAULT_ADDRESS: u8 = 0x3B;

/// This is a list of registers used by the engine. Words are little endian
pub mod regs {
    #![allow(dead_code)]
    pub const STATUS: u8 = 0x00;
    pub const RVBAT: u8 = 0x04;
    pub const RCUR_CC: u8 = 0x06;
    pub const RSOC: u8 = 0x08;
    pub const BATCAP_CTRL: u8 = 0x0C;
    pub const RBATCAP: u8 = 0x0E;
    pub const CAPCC: u8 = 0x1A;
    pub const RESTART: u8 = 0x1E;
    pub const RSOC_FIX: u8 = 0x29;
    pub const MONOUT: u8 = 0x2E;
    pub const MONOUT_SEL: u8 = 0x40;
    pub const FG_MODE: u8 = 0x4A;
    pub const FG_MODE_CFG: u8 = 0x4B;
}

/// Quantities routed through the shared monitor output
pub mod monout_sel {
    pub const DEFAULT: u8 = 0x10;
    pub const AVG_TEMP: u8 = 0x25;
    pub const AVG_CURRENT: u8 = 0x26;
    pub const CYCLE: u8 = 0x27;
    pub const AVG_VBAT: u8 = 0x28;
}

/// Magic values written to the control registers
pub mod values {
    /// FG_MODE contents in current-integration mode
    pub const MODE_CURRENT: u8 = 0x10;
    /// FG_MODE contents in high SOC voltage mode
    pub const MODE_HIGH_SOC_VOLTAGE: u8 = 0xFF;
    /// FG_MODE_CFG bits enabling voltage tracking
    pub const MODE_CFG_VOLTAGE_BITS: u8 = 0x70;

    /// Dump the accumulated state and recalculate SOC
    pub const RESTART_GAUGING: u8 = 0x0F;
    /// Fix raw SOC to the minimum, bit 0 enables the fix
    pub const RSOC_FIX_MIN: u8 = 0x07;
    pub const RSOC_FIX_ENABLE: u8 = 0x01;

    /// Capacity control: latch the written OCV capacity
    pub const BATCAP_OCV_EN: u8 = 0x40;
}

bitflags! {
    /// Contents of the status register
    pub struct StatusFlags: u8 {
        const VM = 1 << 6;
        const CHG = 1 << 5;
        const MONOUT_READY = 1 << 0;
    }
}

impl From<u16> for StatusFlags {
    fn from(value: u16) -> Self {
        StatusFlags::from_bits_truncate(value as u8)
    }
}

/// Battery voltage in mV
pub fn decode_voltage(raw: u16) -> u32 {
    (raw as u32 * 1000) >> 13
}

/// Averaged battery voltage in mV. The averaging filter reports at a finer scale
pub fn decode_avg_voltage(raw: u16) -> u32 {
    (raw as u32 * 1000) >> 12
}

/// Battery current in mA, positive while charging. The gauge itself counts
/// discharge as positive
pub fn decode_current(raw: u16) -> i32 {
    let value = raw as i16 as i32;
    (-value * 1000) >> 11
}

/// Temperature in tenths of a degree, register LSB is 1/256 °C
pub fn decode_temperature(raw: u16) -> i32 {
    let value = raw as i16 as i32;
    ((value * 100) >> 8) / 10
}

/// Coulomb-counted capacity, LSB of the register is half a unit
pub fn decode_capacity_cc(raw: u16) -> i32 {
    let value = raw as i16 as i32;
    if value < 0 {
        -(-value / 2)
    } else {
        value / 2
    }
}

/// OCV-based capacity, two fractional bits
pub fn decode_capacity_ocv(raw: u16) -> u32 {
    (raw >> 2) as u32
}

/// Inverse of [`decode_capacity_ocv`]
pub fn encode_capacity_ocv(capacity: u32) -> u16 {
    (capacity.min(u16::MAX as u32 >> 2) << 2) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voltages() {
        assert_eq!(decode_voltage(0), 0);
        // 4.0V: 4000 << 13 / 1000
        assert_eq!(decode_voltage(32768), 4000);
        assert_eq!(decode_avg_voltage(16384), 4000);
        assert_eq!(decode_avg_voltage(13926), 3399);
    }

    #[test]
    fn current_sign_follows_charging() {
        assert_eq!(decode_current(0), 0);
        // 2048 counts of discharge is one amp out of the battery
        assert_eq!(decode_current(2048), -1000);
        assert_eq!(decode_current((-2048i16) as u16), 1000);
        assert_eq!(decode_current((-1024i16) as u16), 500);
        // arithmetic shift rounds toward minus infinity
        assert_eq!(decode_current(1), -1);
    }

    #[test]
    fn temperature() {
        assert_eq!(decode_temperature(25 * 256), 250);
        assert_eq!(decode_temperature((-10i16 * 256) as u16), -100);
        assert_eq!(decode_temperature(0), 0);
    }

    #[test]
    fn capacities() {
        assert_eq!(decode_capacity_cc(8000), 4000);
        assert_eq!(decode_capacity_cc((-8001i16) as u16), -4000);
        assert_eq!(decode_capacity_ocv(16000), 4000);
        assert_eq!(encode_capacity_ocv(4000), 16000);
        assert_eq!(encode_capacity_ocv(u32::MAX), 0xFFFC);
    }

    #[test]
    fn status_flags_from_word() {
        let flags = StatusFlags::from(0xFF60);
        assert!(flags.contains(StatusFlags::VM | StatusFlags::CHG));
        assert!(!flags.contains(StatusFlags::MONOUT_READY));
    }
}
