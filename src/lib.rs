//! FE-FRT Microphonics Simulator
//!
//! Live telemetry for a simulated superconducting RF cavity with and without
//! a fast reactive tuner (FE-FRT) compensating microphonics detuning.
//!
//! ## Architecture
//!
//! - **Variable Store** (`controls`): operator controls, single writer
//! - **Event Bus** (`events`): declared topics, per-subscriber queues
//! - **Derived-Value Cache** (`cache`): bulk-invalidated loaded-Q set
//! - **Physics Engine** (`physics_engine`, `pipeline`): sample -> power record
//! - **Streaming Consumer** (`feed`): batched ring-buffer window -> frames
//!
//! ```text
//! control surface -> VariableStore -> "input variables changed"
//!     -> DerivedCache -> PhysicsProducer -> results queue -> RenderFeed
//!     -> render surface
//! ```

pub mod cache;
pub mod config;
pub mod controls;
pub mod events;
pub mod feed;
pub mod physics_engine;
pub mod pipeline;
pub mod types;

pub use cache::{DerivedCache, DerivedKey, DerivedValues};
pub use config::{CavityConfig, ConfigError, SimConfig};
pub use controls::{ControlState, InputDriver, StoreReader, Variable, VariableStore};
pub use events::{
    BusError, BusEvent, EventBus, Subscription, CALCULATED_VARIABLES_CHANGED,
    INPUT_VARIABLES_CHANGED,
};
pub use feed::{Frame, RenderFeed, RingBuffer};
pub use pipeline::{DatasetError, LoopingSource, PhysicsProducer, Sample, SampleSource, Trace};
pub use types::{Colour, ControlError, ControlVariable, ResultRecord};

/// Declare every topic the simulator publishes on.
pub fn declare_topics(bus: &EventBus<BusEvent>) {
    bus.declare(INPUT_VARIABLES_CHANGED);
    bus.declare(CALCULATED_VARIABLES_CHANGED);
}
