//! Input driver: the single writer of the Variable Store.
//!
//! Pulls messages from a [`ControlSurface`], resolves them through the
//! [`ControlMap`], writes the store and publishes "input variables changed"
//! for every value that actually moved.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::surface::{ControlMap, ControlMessage, ControlSurface};
use super::{StoreReader, VariableStore};
use crate::events::{BusError, BusEvent, EventBus, INPUT_VARIABLES_CHANGED};

/// Counters reported when the driver stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverStats {
    pub messages: u64,
    pub updates: u64,
    pub ignored: u64,
}

pub struct InputDriver {
    surface: Box<dyn ControlSurface>,
    store: VariableStore,
    bus: Arc<EventBus<BusEvent>>,
    map: ControlMap,
    stats: DriverStats,
}

impl InputDriver {
    /// Take ownership of the store. Readers must be handed out beforehand
    /// or through [`reader`](InputDriver::reader).
    pub fn new(
        surface: Box<dyn ControlSurface>,
        store: VariableStore,
        bus: Arc<EventBus<BusEvent>>,
        map: ControlMap,
    ) -> Self {
        Self {
            surface,
            store,
            bus,
            map,
            stats: DriverStats::default(),
        }
    }

    pub fn reader(&self) -> StoreReader {
        self.store.reader()
    }

    pub fn stats(&self) -> DriverStats {
        self.stats
    }

    /// Apply one message. Returns true if a variable changed (and was published).
    pub async fn apply(&mut self, message: ControlMessage) -> Result<bool, BusError> {
        self.stats.messages += 1;
        let Some((variable, value)) = self.map.resolve(message, &self.store.snapshot()) else {
            self.stats.ignored += 1;
            debug!(?message, "[InputDriver] Unmapped control message");
            return Ok(false);
        };

        if !self.store.set(variable, value) {
            return Ok(false);
        }

        let stored = self.store.snapshot().get(variable);
        info!(%variable, value = stored, "[InputDriver] Updated");
        self.bus
            .publish(
                INPUT_VARIABLES_CHANGED,
                BusEvent::InputChanged {
                    variable,
                    value: stored,
                },
            )
            .await?;
        self.stats.updates += 1;
        Ok(true)
    }

    /// Poll the surface until cancellation.
    ///
    /// A device error is reported once; the driver then idles until
    /// cancelled. A closed surface idles the same way.
    pub async fn run(mut self, cancel: CancellationToken) -> anyhow::Result<DriverStats> {
        info!(
            "[InputDriver] Listening on control surface '{}'",
            self.surface.surface_name()
        );

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => break,
                next = self.surface.next_message() => next,
            };

            match next {
                Ok(Some(message)) => {
                    self.apply(message).await?;
                }
                Ok(None) => {
                    info!("[InputDriver] Control surface closed, controls frozen");
                    cancel.cancelled().await;
                    break;
                }
                Err(e) => {
                    warn!("[InputDriver] Control surface failed, controls disabled: {}", e);
                    cancel.cancelled().await;
                    break;
                }
            }
        }

        info!(
            messages = self.stats.messages,
            updates = self.stats.updates,
            "[InputDriver] Stopped"
        );
        Ok(self.stats)
    }
}
