//! The raw/reported delta is kept across power cycles so that the reported
//! SOC does not jump back to the raw counter after a reboot.

/// Non-volatile storage for the delta. Backing store is up to the board:
/// a battery-backed register, retained RAM, flash...
pub trait DeltaStore {
    /// Returns the last stored delta, `None` if nothing valid was stored
    fn load_delta(&mut self) -> Option<i16>;

    fn store_delta(&mut self, delta: i16);
}

impl<T: DeltaStore> DeltaStore for &mut T {
    fn load_delta(&mut self) -> Option<i16> {
        T::load_delta(self)
    }

    fn store_delta(&mut self, delta: i16) {
        T::store_delta(self, delta)
    }
}

/// Store in plain memory. Put it in a retained section to survive a warm reset
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RamDeltaStore {
    delta: Option<i16>,
}

impl RamDeltaStore {
    pub const fn new() -> Self {
        Self { delta: None }
    }

    /// A store that already holds a delta, e.g. restored by the bootloader
    pub const fn with_delta(delta: i16) -> Self {
        Self { delta: Some(delta) }
    }
}

impl DeltaStore for RamDeltaStore {
    fn load_delta(&mut self) -> Option<i16> {
        self.delta
    }

    fn store_delta(&mut self, delta: i16) {
        self.delta = Some(delta);
    }
}
