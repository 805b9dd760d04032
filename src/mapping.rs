//! Turns the raw counter into the SOC the user sees.
//!
//! The reported SOC is a piecewise-linear function of the raw one. A segment
//! starts at an anchor, a (raw, mapped) pair, and runs to full while charging
//! or to the compensation offset while discharging. The anchor is moved to the
//! current point whenever anything the segment depends on changes, so the
//! reported value never jumps.

use crate::gateway::RegisterGateway;
use crate::persist::DeltaStore;
use crate::sample::RawSample;
use crate::soc::{apply_delta, compensation_offset, map_soc};
use crate::FuelGauge;

/// Everything the current segment was computed under
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Regime {
    pub comp_offset: u32,
    pub battery_is_charging_hw: bool,
    pub vm_status: bool,
    pub is_charging: bool,
}

impl<G, S, E> FuelGauge<G, S>
where
    G: RegisterGateway<Error = E>,
    S: DeltaStore,
{
    /// Moves the anchor to `raw_soc` if the regime changed, or re-seeds it
    /// from the stored delta on an init cycle
    fn reanchor(&mut self, raw_soc: u32, regime: Regime) {
        let state = &mut self.state;

        if state.init_pending {
            state.soc_anchor_mapped = match self.seed_delta.take() {
                Some(delta) => apply_delta(raw_soc, delta),
                None => raw_soc,
            };
            state.soc_anchor_raw = raw_soc;
            state.init_pending = false;

            debug!(
                "anchor seeded at raw {} mapped {}",
                raw_soc, state.soc_anchor_mapped
            );
        } else if let Some(previous) = self.regime.filter(|previous| *previous != regime) {
            // continue from where the outgoing segment currently is
            state.soc_anchor_mapped = map_soc(
                raw_soc,
                state.soc_anchor_raw,
                state.soc_anchor_mapped,
                previous.is_charging,
                previous.comp_offset,
            );
            state.soc_anchor_raw = raw_soc;

            debug!(
                "re-anchored at raw {} mapped {}",
                raw_soc, state.soc_anchor_mapped
            );
        }

        self.regime = Some(regime);
    }

    /// Computes the mapped SOC for this cycle and updates the anchoring state
    pub(crate) fn map_cycle(&mut self, sample: &RawSample, raw_soc: u32) -> u32 {
        self.state.is_charging = self.host.is_charging;
        self.state.battery_is_charging_hw = sample.battery_is_charging_hw;
        self.state.vm_status = sample.vm_status;

        if !self.config.enable_temperature_compensation {
            self.state.comp_offset = 0;
            self.state.init_pending = false;
            return raw_soc;
        }

        let first_cycle = self.regime.is_none();

        self.state.comp_offset = compensation_offset(sample.temperature_dc, sample.avg_current_ma);

        let regime = Regime {
            comp_offset: self.state.comp_offset,
            battery_is_charging_hw: sample.battery_is_charging_hw,
            vm_status: sample.vm_status,
            is_charging: self.host.is_charging,
        };
        self.reanchor(raw_soc, regime);

        let state = &self.state;
        let mut mapped = map_soc(
            raw_soc,
            state.soc_anchor_raw,
            state.soc_anchor_mapped,
            state.is_charging,
            state.comp_offset,
        );

        // no charge-looking jumps while discharging
        if !state.is_charging && !first_cycle && mapped > state.reported_soc {
            mapped = state.reported_soc;
        }

        // a relaxed cold battery may not show more than it has
        if state.vm_status && mapped > raw_soc && sample.temperature_dc <= self.config.low_temp_limit_dc
        {
            mapped = raw_soc;
        }

        mapped
    }
}
