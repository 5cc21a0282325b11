//! Pipeline Regression Tests
//!
//! Wires the real components together (bus, store, input driver, derived
//! cache, producer, render feed) and checks the end-to-end behaviour a
//! render surface relies on.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use frt_simulator::config::defaults::DETUNING_OFFSET;
use frt_simulator::config::{CavityConfig, SimConfig};
use frt_simulator::controls::{ControlMap, ControlMessage, InputDriver, NullSurface, VariableStore};
use frt_simulator::feed::{Frame, Paint, RenderFeed};
use frt_simulator::pipeline::{load_csv, synthetic, LoopingSource, PhysicsProducer, Trace};
use frt_simulator::{declare_topics, BusEvent, ControlVariable, DerivedCache, EventBus};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

fn tesla_cavity() -> CavityConfig {
    CavityConfig {
        resonant_frequency_hz: 1.3e9,
        cavity_voltage_v: 2.0e7,
        intrinsic_q: 1.0e10,
        r_over_q_ohm: 1036.0,
    }
}

struct Harness {
    bus: Arc<EventBus<BusEvent>>,
    driver: InputDriver,
    producer: PhysicsProducer<LoopingSource>,
    feed: RenderFeed,
    frames: watch::Receiver<Option<Arc<Frame>>>,
}

fn harness(cavity: CavityConfig, trace: Trace, window: usize) -> Harness {
    let config = SimConfig {
        cavity,
        ..SimConfig::default()
    };
    let bus = Arc::new(EventBus::new());
    declare_topics(&bus);

    let store = VariableStore::from_config(&config.controls);
    let cache = DerivedCache::new(store.reader(), cavity, Arc::clone(&bus), Duration::ZERO).unwrap();
    let (tx, rx) = mpsc::channel(config.pipeline.results_queue_capacity);
    let (feed, frames) =
        RenderFeed::new(rx, store.reader(), &bus, config.pipeline.batch_size, window).unwrap();
    let producer = PhysicsProducer::new(
        LoopingSource::new(trace, 0),
        cache,
        cavity,
        DETUNING_OFFSET,
        None,
        tx,
    );
    let driver = InputDriver::new(
        Box::new(NullSurface),
        store,
        Arc::clone(&bus),
        ControlMap::default(),
    );

    Harness {
        bus,
        driver,
        producer,
        feed,
        frames,
    }
}

/// Wait for the next frame matching `pred`, failing after a generous timeout.
async fn wait_for_frame(
    frames: &mut watch::Receiver<Option<Arc<Frame>>>,
    pred: impl Fn(&Frame) -> bool,
) -> Arc<Frame> {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            frames.changed().await.unwrap();
            let frame = frames.borrow_and_update().clone();
            if let Some(frame) = frame {
                if pred(&frame) {
                    return frame;
                }
            }
        }
    })
    .await
    .expect("frame did not arrive in time")
}

#[tokio::test]
async fn frames_follow_frt_toggle_end_to_end() {
    let Harness {
        bus: _bus,
        mut driver,
        producer,
        feed,
        mut frames,
    } = harness(tesla_cavity(), synthetic(200, 3).unwrap(), 50);

    let cancel = CancellationToken::new();
    let feed_task = tokio::spawn(feed.run(cancel.clone()));
    let producer_task = tokio::spawn(producer.run(cancel.clone()));

    let first = wait_for_frame(&mut frames, |_| true).await;
    assert!(!first.frt_on());
    assert_eq!(first.styling.primary.paint, Paint::PerPoint);
    assert_eq!(first.batch.len(), 10);
    assert!(first.derived.generation >= 1);

    let changed = driver
        .apply(ControlMessage::NoteOn {
            note: 40,
            velocity: 127,
        })
        .await
        .unwrap();
    assert!(changed);

    let toggled = wait_for_frame(&mut frames, |f| f.frt_on() && f.derived.inputs.frt_on()).await;
    assert_eq!(toggled.styling.secondary.paint, Paint::PerPoint);
    assert_eq!(toggled.styling.primary.alpha, 0.5);
    assert_eq!(
        toggled.inputs.qe_opt_marker,
        toggled.derived.loaded_q.qe_opt_frt
    );

    cancel.cancel();
    let feed_stats = feed_task.await.unwrap().unwrap();
    let producer_stats = producer_task.await.unwrap().unwrap();
    assert!(producer_stats.records >= feed_stats.records);
    assert!(feed_stats.batches >= 2);
}

#[tokio::test]
async fn window_time_is_monotonic_across_dataset_wraps() {
    let trace = synthetic(40, 9).unwrap();
    let pass = trace.pass_duration();
    let Harness {
        producer,
        feed,
        mut frames,
        ..
    } = harness(tesla_cavity(), trace, 100);

    let cancel = CancellationToken::new();
    let feed_task = tokio::spawn(feed.run(cancel.clone()));
    let producer_task = tokio::spawn(producer.run(cancel.clone()));

    // 20 batches of 10 = five passes through a 40-sample trace.
    let frame = wait_for_frame(&mut frames, |f| f.sequence >= 20).await;
    cancel.cancel();
    feed_task.await.unwrap().unwrap();
    let producer_stats = producer_task.await.unwrap().unwrap();

    assert_eq!(frame.window.len(), 100);
    for pair in frame.window.windows(2) {
        assert!(pair[1].record.time > pair[0].record.time);
    }
    assert!(frame.axes.time.1 > 4.0 * pass);
    assert!(producer_stats.wraps >= 4);
}

#[tokio::test]
async fn zero_cavity_runs_with_zero_power() {
    let Harness {
        producer,
        feed,
        mut frames,
        ..
    } = harness(CavityConfig::default(), synthetic(64, 1).unwrap(), 32);

    let cancel = CancellationToken::new();
    let feed_task = tokio::spawn(feed.run(cancel.clone()));
    let producer_task = tokio::spawn(producer.run(cancel.clone()));

    let frame = wait_for_frame(&mut frames, |f| f.sequence >= 3).await;
    cancel.cancel();
    feed_task.await.unwrap().unwrap();
    producer_task.await.unwrap().unwrap();

    for point in &frame.window {
        let r = point.record;
        assert_eq!(r.power, 0.0);
        assert_eq!(r.power_secondary, 0.0);
        assert!(r.avg_power.is_finite());
        assert!(r.detuning.is_finite());
    }
    assert_eq!(frame.derived.loaded_q.qe_opt, 0.0);
}

#[tokio::test]
async fn csv_trace_at_offset_gives_zero_secondary_detuning() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "time,detuning").unwrap();
    writeln!(file, "0.0,{DETUNING_OFFSET}").unwrap();
    file.flush().unwrap();
    let trace = load_csv(file.path()).unwrap();

    let Harness {
        mut driver,
        mut producer,
        feed: _feed,
        ..
    } = harness(tesla_cavity(), trace, 8);

    for (variable, value) in [
        (ControlVariable::UphonicsRange, 20.0),
        (ControlVariable::TuningRange, 25.0),
        (ControlVariable::Qe, 1.0e7),
    ] {
        driver
            .apply(ControlMessage::Set { variable, value })
            .await
            .unwrap();
    }

    let record = producer.compute_next().await.unwrap();
    assert!((record.detuning - 0.693_767_5).abs() < 1e-9);
    assert_eq!(record.detuning_secondary, 0.0);
    assert_eq!(record.avg_power, record.power);
}

#[tokio::test]
async fn undeclared_topic_is_a_hard_error() {
    let bus: EventBus<BusEvent> = EventBus::new();
    assert!(bus.subscribe("input variables changed").is_err());
    declare_topics(&bus);
    declare_topics(&bus);
    assert!(bus.subscribe("input variables changed").is_ok());
    assert!(bus
        .publish(
            "nobody",
            BusEvent::InputChanged {
                variable: ControlVariable::FoM,
                value: 1.0
            }
        )
        .await
        .is_err());
}
