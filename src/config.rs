//! Board-level constants. Loaded once, when the gauge handle is created.

use crate::ChipError;

/// Maximum number of points in the OCV table
pub const OCV_TABLE_SIZE: usize = 22;

/// Parameters of the capacity learning process
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LearningConfig {
    /// Learning is only started on a battery with at least this many cycles
    pub cycle_threshold: u32,

    /// Battery voltage (mV) that counts as "charged" during condition 1.
    /// Condition 2 accepts 100mV less
    pub vbat_threshold_mv: u32,

    /// Average current (mA) has to stay below this while charged
    pub current_threshold_ma: i32,

    /// Consecutive cycles needed for condition 1
    pub required_count_1: u32,

    /// Consecutive relaxed cycles needed for condition 2
    pub required_count_2: u32,

    /// Production cells use the narrow 900..1100 per-mille acceptance
    /// window, everything else 800..1100
    pub production: bool,

    /// Blend the measured capacity at 25% instead of 10%
    pub heavy_weight: bool,

    /// Write the learned capacity back to the chip
    pub write_back: bool,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            cycle_threshold: 30,
            vbat_threshold_mv: 4200,
            current_threshold_ma: 500,
            required_count_1: 10,
            required_count_2: 10,
            production: true,
            heavy_weight: false,
            write_back: true,
        }
    }
}

/// A (SOC, OCV) lookup table with SOC descending, as the characterization
/// data is usually shipped
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OcvTable {
    /// SOC in hundredths of a percent
    pub soc: [i32; OCV_TABLE_SIZE],
    /// OCV in mV
    pub ocv: [i32; OCV_TABLE_SIZE],
    pub len: usize,
}

impl OcvTable {
    pub const fn empty() -> Self {
        Self {
            soc: [0; OCV_TABLE_SIZE],
            ocv: [0; OCV_TABLE_SIZE],
            len: 0,
        }
    }

    /// Builds a table from `(soc, ocv)` points, keeping at most
    /// [`OCV_TABLE_SIZE`] of them
    pub fn from_points(points: &[(i32, i32)]) -> Self {
        let mut table = Self::empty();

        for (i, (soc, ocv)) in points.iter().take(OCV_TABLE_SIZE).enumerate() {
            table.soc[i] = *soc;
            table.ocv[i] = *ocv;
            table.len = i + 1;
        }

        table
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Looks up the OCV for a given SOC, interpolating between points and
    /// saturating at the ends of the table
    pub fn ocv_for_soc(&self, soc: i32) -> Option<i32> {
        if self.is_empty() {
            return None;
        }

        let soc_arr = &self.soc[..self.len];
        let ocv_arr = &self.ocv[..self.len];
        let last = self.len - 1;

        if soc <= soc_arr[last] {
            return Some(ocv_arr[last]);
        }
        if soc >= soc_arr[0] {
            return Some(ocv_arr[0]);
        }

        // SOC is descending, so `high` ends up on the bigger SOC
        let (mut low, mut high) = (0usize, last);
        while high - low > 1 {
            let mid = (low + high) / 2;
            if soc_arr[mid] > soc {
                low = mid;
            } else if soc_arr[mid] < soc {
                high = mid;
            } else {
                return Some(ocv_arr[mid]);
            }
        }

        let span = soc_arr[low] - soc_arr[high];
        if span == 0 {
            return Some(ocv_arr[low]);
        }

        Some(ocv_arr[high] + (ocv_arr[low] - ocv_arr[high]) * (soc - soc_arr[high]) / span)
    }
}

impl Default for OcvTable {
    fn default() -> Self {
        Self::empty()
    }
}

/// Everything the engine needs to know about the board and the cell
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Design capacity, in the same units as the chip capacity registers
    pub nominal_capacity: u32,

    /// Used when the host does not report the charger float voltage
    pub float_voltage_mv: u32,

    /// Below this temperature (tenths of °C) the cold-battery rules apply
    pub low_temp_limit_dc: i32,

    /// Average voltage (mV) below which the battery is considered empty
    pub low_voltage_limit_mv: u32,

    /// Charging current (mA) below which the high SOC voltage mode may be entered
    pub high_soc_entry_current_ma: i32,

    /// Charging current (mA) at or above which the high SOC voltage mode is left
    pub high_soc_exit_current_ma: i32,

    pub enable_temperature_compensation: bool,
    pub enable_capacity_learning: bool,

    pub learning: LearningConfig,
    pub ocv_table: OcvTable,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            nominal_capacity: 0,
            float_voltage_mv: 4350,
            low_temp_limit_dc: 100,
            low_voltage_limit_mv: 3400,
            high_soc_entry_current_ma: 500,
            high_soc_exit_current_ma: 550,
            enable_temperature_compensation: true,
            enable_capacity_learning: true,
            learning: LearningConfig::default(),
            ocv_table: OcvTable::empty(),
        }
    }
}

impl Config {
    /// Checks that every mandatory value has been provided
    pub fn validate<E>(&self) -> Result<(), ChipError<E>> {
        if self.nominal_capacity == 0 {
            return Err(ChipError::ConfigurationMissing("nominal capacity"));
        }

        if self.ocv_table.is_empty() {
            return Err(ChipError::ConfigurationMissing("ocv table"));
        }

        if self.enable_capacity_learning
            && (self.learning.required_count_1 == 0 || self.learning.required_count_2 == 0)
        {
            return Err(ChipError::ConfigurationMissing("learning counts"));
        }

        Ok(())
    }
}
