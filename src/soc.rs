//! Fixed-point SOC arithmetic. All SOC values are in hundredths of a percent.
//!
//! Everything here is pure, the engine feeds it with the latest sample and
//! keeps the state.

/// 100.00%
pub const SOC_FULL: u32 = 10000;

/// Charging mapping aims slightly above full so that 100% is actually reached
const SOC_CHARGE_TARGET: i64 = 10040;

/// Above this raw SOC the charging segment is flat
const SOC_CHARGE_FLAT: u32 = 9950;

/// Upper bound of the compensation offset, in percent
pub const COMP_OFFSET_MAX: u32 = 80;

const COUNTER_FRACTION_BITS: u32 = 14;

/// Decodes the hardware SOC counter. Bit 15 is the sign, bits 0..14 are the
/// fraction of full scale (2^14).
///
/// The result may be negative (underflow) or above 100% for a counter that
/// overshoots, use [`raw_soc_from_counter`] to get a usable value.
pub fn decode_raw_soc(counter_reg: i16) -> i32 {
    let reg = counter_reg as u16;

    if reg & 0x8000 != 0 {
        let magnitude = ((!reg) & 0x7FFF) as i32 + 1;
        -((magnitude * 10000) >> COUNTER_FRACTION_BITS)
    } else {
        ((reg & 0x7FFF) as i32 * 10000) >> COUNTER_FRACTION_BITS
    }
}

/// Raw SOC clamped to `[0, SOC_FULL]`
pub fn raw_soc_from_counter(counter_reg: i16) -> u32 {
    decode_raw_soc(counter_reg).clamp(0, SOC_FULL as i32) as u32
}

/// Computes the SOC offset (in percent, multiple of 5) that is hidden from
/// the user at low temperature and high load.
///
/// Temperatures above 200.0°C are treated as 200.0°C.
pub fn compensation_offset(temp_dc: i32, avg_current_ma: i32) -> u32 {
    let i_socr = -222 * avg_current_ma as i64;

    let temp_c = (temp_dc.min(2000) / 10) as i64;
    let t_socr = if temp_dc <= -100 {
        (-223 * temp_c + 6500) / 1000
    } else {
        (-30 * temp_c + 6500) / 1000
    };

    let comp = ((t_socr + 1) * i_socr) / 100_000;
    let comp = comp - (comp % 5);

    comp.clamp(0, COMP_OFFSET_MAX as i64) as u32
}

/// Maps raw SOC onto the reported scale using the anchor point.
///
/// While charging the segment goes from the anchor to (100%, 100.4%), while
/// discharging from the anchor down to (`comp_offset`%, 0%).
pub fn map_soc(
    raw_soc: u32,
    anchor_raw: u32,
    anchor_mapped: u32,
    charging: bool,
    comp_offset: u32,
) -> u32 {
    let raw = raw_soc as i64;
    let a_raw = anchor_raw as i64;
    let a_mapped = anchor_mapped as i64;

    let mapped = if charging {
        if anchor_raw >= SOC_CHARGE_FLAT {
            a_mapped
        } else {
            (SOC_CHARGE_TARGET - a_mapped) * (raw - a_raw) / (SOC_FULL as i64 - a_raw) + a_mapped
        }
    } else {
        let empty = 100 * comp_offset as i64;
        if a_raw < empty + 50 {
            0
        } else {
            a_mapped * (raw - a_raw) / (a_raw - empty) + a_mapped
        }
    };

    mapped.clamp(0, SOC_FULL as i64) as u32
}

/// `mapped - raw` as stored across power cycles
pub fn soc_delta(mapped: u32, raw_soc: u32) -> i16 {
    (mapped as i32 - raw_soc as i32).clamp(-(SOC_FULL as i32), SOC_FULL as i32) as i16
}

/// Applies a stored delta to a fresh raw SOC
pub fn apply_delta(raw_soc: u32, delta: i16) -> u32 {
    (raw_soc as i32 + delta as i32).clamp(0, SOC_FULL as i32) as u32
}
