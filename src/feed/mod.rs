//! Streaming Consumer - ring-buffer window behind the render surface.
//!
//! The [`RenderFeed`] drains the results queue in fixed-size batches,
//! appends every record (with the plotting colour current at that moment)
//! to a ring-buffer window, rescales the axes and publishes a [`Frame`] on
//! a `watch` channel. The render loop picks up whichever frame is newest.
//!
//! The feed keeps its own views of the inputs and of the derived set, each
//! kept fresh by a bus subscription, so it never touches the producer's
//! cache.

pub mod axis;
pub mod frame;
pub mod ring_buffer;
pub mod surface;

pub use axis::{AxisBound, Axes};
pub use frame::{Frame, InputPanel, Paint, PathStyle, PlotPoint, Styling};
pub use ring_buffer::RingBuffer;
pub use surface::{run_render_loop, LogSurface, RecordingSurface, RenderSurface, SurfaceStatus};

use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cache::DerivedValues;
use crate::controls::{ControlState, StoreReader};
use crate::events::{
    BusError, BusEvent, EventBus, Subscription, CALCULATED_VARIABLES_CHANGED,
    INPUT_VARIABLES_CHANGED,
};
use crate::types::ResultRecord;

// ============================================================================
// Views
// ============================================================================

/// Cached copy of the control state, invalidated by "input variables changed".
pub struct InputView {
    store: StoreReader,
    changes: Subscription<BusEvent>,
    cached: ControlState,
    valid: bool,
}

impl InputView {
    pub fn new(store: StoreReader, bus: &EventBus<BusEvent>) -> Result<Self, BusError> {
        Ok(Self {
            changes: bus.subscribe(INPUT_VARIABLES_CHANGED)?,
            cached: store.snapshot(),
            store,
            valid: true,
        })
    }

    pub fn get(&mut self) -> ControlState {
        while self.changes.try_recv().is_some() {
            self.valid = false;
        }
        if !self.valid {
            self.cached = self.store.snapshot();
            self.valid = true;
        }
        self.cached
    }
}

/// Latest derived set as announced on "calculated variables changed".
pub struct DerivedView {
    changes: Subscription<BusEvent>,
    latest: DerivedValues,
}

impl DerivedView {
    pub fn new(bus: &EventBus<BusEvent>) -> Result<Self, BusError> {
        Ok(Self {
            changes: bus.subscribe(CALCULATED_VARIABLES_CHANGED)?,
            latest: DerivedValues::default(),
        })
    }

    pub fn get(&mut self) -> DerivedValues {
        while let Some(event) = self.changes.try_recv() {
            if let BusEvent::DerivedChanged(values) = event {
                self.latest = *values;
            }
        }
        self.latest
    }
}

// ============================================================================
// Render Feed
// ============================================================================

/// Counters reported when the feed stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedStats {
    pub batches: u64,
    pub records: u64,
}

pub struct RenderFeed {
    results: mpsc::Receiver<ResultRecord>,
    inputs: InputView,
    derived: DerivedView,
    window: RingBuffer<PlotPoint>,
    batch_size: usize,
    detuning_axis: AxisBound,
    power_axis: AxisBound,
    frames: watch::Sender<Option<Arc<Frame>>>,
    stats: FeedStats,
}

impl RenderFeed {
    /// Subscribe to the bus and return the feed plus the frame receiver.
    ///
    /// Build the feed before the producer starts so that it sees the first
    /// derived-set announcement.
    pub fn new(
        results: mpsc::Receiver<ResultRecord>,
        store: StoreReader,
        bus: &EventBus<BusEvent>,
        batch_size: usize,
        window_samples: usize,
    ) -> Result<(Self, watch::Receiver<Option<Arc<Frame>>>), BusError> {
        let (frames, frames_rx) = watch::channel(None);
        let feed = Self {
            results,
            inputs: InputView::new(store, bus)?,
            derived: DerivedView::new(bus)?,
            window: RingBuffer::new(window_samples),
            batch_size: batch_size.max(1),
            detuning_axis: AxisBound::default(),
            power_axis: AxisBound::default(),
            frames,
            stats: FeedStats::default(),
        };
        Ok((feed, frames_rx))
    }

    pub fn stats(&self) -> FeedStats {
        self.stats
    }

    pub fn window(&self) -> &RingBuffer<PlotPoint> {
        &self.window
    }

    /// Wait for a full batch. A shorter batch is returned only when the
    /// queue has closed; `None` once it is closed and empty.
    pub async fn next_batch(&mut self) -> Option<Vec<ResultRecord>> {
        let mut batch = Vec::with_capacity(self.batch_size);
        while batch.len() < self.batch_size {
            match self.results.recv().await {
                Some(record) => batch.push(record),
                None => break,
            }
        }
        (!batch.is_empty()).then_some(batch)
    }

    /// Append a batch to the window and publish the resulting frame.
    pub fn ingest(&mut self, batch: Vec<ResultRecord>) -> Arc<Frame> {
        let inputs = self.inputs.get();
        let derived = self.derived.get();

        for record in &batch {
            self.window.push(PlotPoint {
                record: *record,
                colour: derived.colour,
            });
        }
        self.stats.batches += 1;
        self.stats.records += batch.len() as u64;

        let axes = self.rescale_axes();
        let frame = Arc::new(Frame {
            sequence: self.stats.batches,
            batch,
            window: self.window.to_vec(),
            derived,
            inputs: InputPanel::new(&inputs, &derived),
            axes,
            styling: Styling::for_mode(inputs.frt_on(), derived.colour),
        });
        self.frames.send_replace(Some(Arc::clone(&frame)));
        frame
    }

    fn rescale_axes(&mut self) -> Axes {
        let mut largest_detuning = 0.0f64;
        let mut largest_power = 0.0f64;
        let mut time = (f64::INFINITY, f64::NEG_INFINITY);
        for point in self.window.iter() {
            let r = &point.record;
            largest_detuning = largest_detuning.max(r.detuning.abs());
            largest_power = largest_power.max(r.power);
            time = (time.0.min(r.time), time.1.max(r.time));
        }

        let detuning_rescaled = self.detuning_axis.update(largest_detuning);
        let power_rescaled = self.power_axis.update(largest_power);
        if detuning_rescaled || power_rescaled {
            debug!(
                detuning = ?self.detuning_axis.bound(),
                power = ?self.power_axis.bound(),
                "[RenderFeed] Axes rescaled"
            );
        }
        let detuning = self.detuning_axis.bound().unwrap_or(0.0);
        Axes {
            detuning: (-detuning, detuning),
            power: (0.0, self.power_axis.bound().unwrap_or(0.0)),
            time: if time.0 <= time.1 { time } else { (0.0, 0.0) },
        }
    }

    /// Consume batches until cancelled or the producer goes away.
    pub async fn run(mut self, cancel: CancellationToken) -> anyhow::Result<FeedStats> {
        info!(
            batch_size = self.batch_size,
            window = self.window.capacity(),
            "[RenderFeed] Consuming results"
        );

        loop {
            let batch = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("[RenderFeed] Shutdown signal received");
                    break;
                }
                batch = self.next_batch() => batch,
            };
            match batch {
                Some(batch) => {
                    self.ingest(batch);
                }
                None => {
                    info!("[RenderFeed] Results queue closed");
                    break;
                }
            }
        }

        info!(
            batches = self.stats.batches,
            records = self.stats.records,
            "[RenderFeed] Stopped"
        );
        Ok(self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controls::VariableStore;
    use crate::types::ControlVariable;

    fn record(time: f64, detuning: f64, power: f64) -> ResultRecord {
        ResultRecord {
            time,
            detuning,
            detuning_secondary: 0.0,
            power,
            power_secondary: power / 2.0,
            avg_power: power,
            avg_power_secondary: power / 2.0,
        }
    }

    fn bus() -> EventBus<BusEvent> {
        let bus = EventBus::new();
        bus.declare(INPUT_VARIABLES_CHANGED);
        bus.declare(CALCULATED_VARIABLES_CHANGED);
        bus
    }

    #[tokio::test]
    async fn waits_for_full_batches() {
        let bus = bus();
        let store = VariableStore::new(ControlState::default());
        let (tx, rx) = mpsc::channel(32);
        let (mut feed, _frames) = RenderFeed::new(rx, store.reader(), &bus, 3, 100).unwrap();

        for i in 0..7 {
            tx.send(record(i as f64, 1.0, 1.0)).await.unwrap();
        }
        drop(tx);

        assert_eq!(feed.next_batch().await.map(|b| b.len()), Some(3));
        assert_eq!(feed.next_batch().await.map(|b| b.len()), Some(3));
        assert_eq!(feed.next_batch().await.map(|b| b.len()), Some(1));
        assert_eq!(feed.next_batch().await, None);
    }

    #[tokio::test]
    async fn window_is_bounded_and_frames_are_published() {
        let bus = bus();
        let store = VariableStore::new(ControlState::default());
        let (_tx, rx) = mpsc::channel(1);
        let (mut feed, frames) = RenderFeed::new(rx, store.reader(), &bus, 2, 3).unwrap();

        feed.ingest(vec![record(0.0, -4.0, 10.0), record(1.0, 2.0, 20.0)]);
        let frame = feed.ingest(vec![record(2.0, 1.0, 5.0), record(3.0, 1.0, 5.0)]);

        assert_eq!(feed.window().len(), 3);
        let times: Vec<f64> = frame.window.iter().map(|p| p.record.time).collect();
        assert_eq!(times, vec![1.0, 2.0, 3.0]);
        assert_eq!(frame.sequence, 2);
        assert_eq!(frame.axes.time, (1.0, 3.0));
        assert_eq!(frames.borrow().as_ref().map(|f| f.sequence), Some(2));
    }

    #[tokio::test]
    async fn axes_apply_hysteresis_between_batches() {
        let bus = bus();
        let store = VariableStore::new(ControlState::default());
        let (_tx, rx) = mpsc::channel(1);
        let (mut feed, _frames) = RenderFeed::new(rx, store.reader(), &bus, 1, 1).unwrap();

        let first = feed.ingest(vec![record(0.0, -10.0, 100.0)]);
        assert!((first.axes.detuning.1 - 10.5).abs() < 1e-12);
        assert!((first.axes.detuning.0 + 10.5).abs() < 1e-12);
        assert!((first.axes.power.1 - 105.0).abs() < 1e-12);

        let inside = feed.ingest(vec![record(1.0, 9.0, 90.0)]);
        assert_eq!(inside.axes.detuning, first.axes.detuning);
        assert_eq!(inside.axes.power, first.axes.power);

        let shrunk = feed.ingest(vec![record(2.0, 1.0, 10.0)]);
        assert!((shrunk.axes.detuning.1 - 1.05).abs() < 1e-12);
        assert!((shrunk.axes.power.1 - 10.5).abs() < 1e-12);
    }

    #[tokio::test]
    async fn views_follow_bus_notifications() {
        let bus = bus();
        let mut store = VariableStore::new(ControlState::default());
        let (_tx, rx) = mpsc::channel(1);
        let (mut feed, _frames) = RenderFeed::new(rx, store.reader(), &bus, 1, 4).unwrap();

        store.set(ControlVariable::FrtOn, 1.0);
        bus.publish(
            INPUT_VARIABLES_CHANGED,
            BusEvent::InputChanged {
                variable: ControlVariable::FrtOn,
                value: 1.0,
            },
        )
        .await
        .unwrap();
        let mut derived = DerivedValues::default();
        derived.colour = crate::cache::PALETTE[3];
        derived.generation = 4;
        bus.publish(
            CALCULATED_VARIABLES_CHANGED,
            BusEvent::DerivedChanged(Box::new(derived)),
        )
        .await
        .unwrap();

        let frame = feed.ingest(vec![record(0.0, 1.0, 1.0)]);
        assert!(frame.frt_on());
        assert_eq!(frame.derived.generation, 4);
        assert_eq!(frame.window[0].colour, crate::cache::PALETTE[3]);
        assert_eq!(frame.styling.secondary.paint, Paint::PerPoint);
    }
}
