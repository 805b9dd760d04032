//! A gauge that can be shared between tasks.
//!
//! Monitor reads go through one multiplexer on the chip, so two cycles must
//! never overlap. The whole cycle runs under the lock, and the guard goes
//! away on every exit path, errors included.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::{Mutex, MutexGuard};

use crate::gateway::RegisterGateway;
use crate::persist::DeltaStore;
use crate::{CapacityReport, ChipError, EngineState, FuelGauge, HostStatus, ReportedSoc};

pub struct SharedFuelGauge<M: RawMutex, G, S> {
    gauge: Mutex<M, FuelGauge<G, S>>,
}

impl<M: RawMutex, G, S> SharedFuelGauge<M, G, S> {
    pub const fn new(gauge: FuelGauge<G, S>) -> Self {
        Self {
            gauge: Mutex::new(gauge),
        }
    }

    /// Exclusive access for as long as the guard lives
    pub async fn lock(&self) -> MutexGuard<'_, M, FuelGauge<G, S>> {
        self.gauge.lock().await
    }

    /// Runs `f` with the gauge locked
    pub async fn with<R>(&self, f: impl FnOnce(&mut FuelGauge<G, S>) -> R) -> R {
        let mut gauge = self.gauge.lock().await;
        f(&mut gauge)
    }

    /// Engine state, unless a cycle is running right now
    pub fn try_state(&self) -> Option<EngineState> {
        self.gauge.try_lock().ok().map(|gauge| gauge.state)
    }

    pub fn into_inner(self) -> FuelGauge<G, S> {
        self.gauge.into_inner()
    }
}

impl<M, G, S, E> SharedFuelGauge<M, G, S>
where
    M: RawMutex,
    G: RegisterGateway<Error = E>,
    S: DeltaStore,
{
    pub async fn estimate(&self) -> Result<ReportedSoc, ChipError<E>> {
        self.gauge.lock().await.estimate().await
    }

    pub async fn set_host_status(&self, host: HostStatus) {
        self.gauge.lock().await.set_host_status(host);
    }

    pub async fn capacity_report(&self) -> CapacityReport {
        self.gauge.lock().await.capacity_report()
    }

    pub async fn restart_gauging(&self) -> Result<(), ChipError<E>> {
        self.gauge.lock().await.restart_gauging().await
    }
}
