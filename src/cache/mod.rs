//! Derived-Value Cache
//!
//! Lazily recomputes the derived cavity quantities from the Variable Store.
//! A single `valid` flag covers the whole set: any "input variables changed"
//! notification clears it, and the next read recomputes everything at once.
//! Any number of reads between two invalidations cost exactly one recompute,
//! and any number of pending invalidations fold into that one recompute.
//!
//! The cache owns its bus subscription. Pending notifications are drained in
//! publish order before every read, so no read observes values older than
//! the latest input change that was published before it.

pub mod colour;

pub use colour::{ColourCycle, PALETTE};

use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::CavityConfig;
use crate::controls::{ControlState, StoreReader};
use crate::events::{
    BusError, BusEvent, EventBus, Subscription, CALCULATED_VARIABLES_CHANGED,
    INPUT_VARIABLES_CHANGED,
};
use crate::physics_engine::{loaded_q, LoadedQ};
use crate::types::{Colour, ControlVariable};

/// Numeric derived quantities, addressable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DerivedKey {
    QeOpt,
    QFrt,
    QeOptFrt,
    QL,
    QLFrt,
}

impl DerivedKey {
    pub const ALL: [Self; 5] = [Self::QeOpt, Self::QFrt, Self::QeOptFrt, Self::QL, Self::QLFrt];

    pub const fn name(self) -> &'static str {
        match self {
            Self::QeOpt => "Qe_opt",
            Self::QFrt => "Q_FRT",
            Self::QeOptFrt => "Qe_opt_FRT",
            Self::QL => "QL",
            Self::QLFrt => "QL_FRT",
        }
    }
}

/// One consistent recompute of the derived set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DerivedValues {
    /// Control state the values were computed from
    pub inputs: ControlState,
    pub loaded_q: LoadedQ,
    /// Current rotating plot colour
    pub colour: Colour,
    /// Number of recomputes so far (0 = never computed)
    pub generation: u64,
}

impl DerivedValues {
    pub fn get(&self, key: DerivedKey) -> f64 {
        let q = &self.loaded_q;
        match key {
            DerivedKey::QeOpt => q.qe_opt,
            DerivedKey::QFrt => q.q_frt,
            DerivedKey::QeOptFrt => q.qe_opt_frt,
            DerivedKey::QL => q.ql,
            DerivedKey::QLFrt => q.ql_frt,
        }
    }

    /// Qe optimum marker for the active feedback mode.
    pub fn active_qe_opt(&self) -> f64 {
        if self.inputs.frt_on() {
            self.loaded_q.qe_opt_frt
        } else {
            self.loaded_q.qe_opt
        }
    }
}

impl Default for DerivedValues {
    fn default() -> Self {
        Self {
            inputs: ControlState::default(),
            loaded_q: LoadedQ::default(),
            colour: PALETTE[0],
            generation: 0,
        }
    }
}

/// Bulk-invalidated cache of [`DerivedValues`].
pub struct DerivedCache {
    store: StoreReader,
    cavity: CavityConfig,
    bus: Arc<EventBus<BusEvent>>,
    invalidations: Subscription<BusEvent>,
    values: DerivedValues,
    valid: bool,
    colours: ColourCycle,
}

impl DerivedCache {
    /// Create the cache and subscribe it to input changes.
    ///
    /// Starts invalid, so the first read computes.
    pub fn new(
        store: StoreReader,
        cavity: CavityConfig,
        bus: Arc<EventBus<BusEvent>>,
        colour_interval: Duration,
    ) -> Result<Self, BusError> {
        let invalidations = bus.subscribe(INPUT_VARIABLES_CHANGED)?;
        Ok(Self {
            store,
            cavity,
            bus,
            invalidations,
            values: DerivedValues::default(),
            valid: false,
            colours: ColourCycle::new(colour_interval, Instant::now()),
        })
    }

    /// Mark the whole derived set stale.
    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    /// Apply every queued input-change notification, in order.
    ///
    /// Returns the number of notifications consumed.
    pub fn sync_invalidations(&mut self) -> usize {
        let mut seen = 0;
        while let Some(event) = self.invalidations.try_recv() {
            if let BusEvent::InputChanged { variable, value } = event {
                debug!(%variable, value, "Derived cache invalidated");
            }
            self.invalidate();
            seen += 1;
        }
        seen
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Number of full recomputes performed.
    pub fn generation(&self) -> u64 {
        self.values.generation
    }

    /// Read one derived quantity, recomputing the whole set if stale.
    pub async fn get(&mut self, key: DerivedKey) -> Result<f64, BusError> {
        self.ensure_fresh().await?;
        Ok(self.values.get(key))
    }

    /// Read one control value through the cache.
    pub async fn input(&mut self, var: ControlVariable) -> Result<f64, BusError> {
        self.ensure_fresh().await?;
        Ok(self.values.inputs.get(var))
    }

    /// Fresh copy of the whole derived set.
    pub async fn snapshot(&mut self) -> Result<DerivedValues, BusError> {
        self.ensure_fresh().await?;
        Ok(self.values)
    }

    async fn ensure_fresh(&mut self) -> Result<(), BusError> {
        self.sync_invalidations();
        if self.valid {
            return Ok(());
        }

        self.recompute(Instant::now());
        self.bus
            .publish(
                CALCULATED_VARIABLES_CHANGED,
                BusEvent::DerivedChanged(Box::new(self.values)),
            )
            .await?;
        Ok(())
    }

    fn recompute(&mut self, now: Instant) {
        let inputs = self.store.snapshot();
        self.colours.advance(now);
        self.values = DerivedValues {
            inputs,
            loaded_q: loaded_q(
                &self.cavity,
                inputs.get(ControlVariable::FoM),
                inputs.get(ControlVariable::Qe),
                inputs.get(ControlVariable::UphonicsRange),
                inputs.get(ControlVariable::TuningRange),
            ),
            colour: self.colours.current(),
            generation: self.values.generation + 1,
        };
        self.valid = true;
        debug!(
            generation = self.values.generation,
            ql = self.values.loaded_q.ql,
            ql_frt = self.values.loaded_q.ql_frt,
            "Derived values recomputed"
        );
    }
}
