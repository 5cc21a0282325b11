//! Streaming Pipeline Module
//!
//! ```text
//! SampleSource ──► PhysicsProducer ──► bounded results queue ──► RenderFeed
//!                        ▲
//!                  DerivedCache ◄── "input variables changed"
//! ```
//!
//! The bounded results queue is the only flow-control point: a slow
//! consumer suspends the producer, nothing is dropped.

pub mod dataset;
pub mod producer;
pub mod source;

pub use dataset::{load_csv, synthetic, write_csv, DatasetError, Trace};
pub use producer::{PhysicsProducer, ProducerStats};
pub use source::{LoopingSource, Sample, SampleSource};
