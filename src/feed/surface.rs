//! Render surfaces and the refresh loop that drives them.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::frame::Frame;

/// Returned by a surface after drawing a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceStatus {
    Open,
    /// The user closed the surface; the whole simulator shuts down.
    Closed,
}

/// Where frames are drawn.
pub trait RenderSurface: Send + 'static {
    fn render(&mut self, frame: &Frame) -> SurfaceStatus;

    fn surface_name(&self) -> &str;
}

/// Headless surface that logs one summary line per refresh.
#[derive(Debug, Default)]
pub struct LogSurface;

impl RenderSurface for LogSurface {
    fn render(&mut self, frame: &Frame) -> SurfaceStatus {
        let Some(latest) = frame.batch.last() else {
            return SurfaceStatus::Open;
        };
        info!(
            frame = frame.sequence,
            t = %format!("{:.4}", latest.time),
            detuning_hz = %format!("{:.3}", latest.detuning),
            power_w = %format!("{:.1}", latest.power),
            avg_power_w = %format!("{:.1}", latest.avg_power),
            power_frt_w = %format!("{:.1}", latest.power_secondary),
            avg_power_frt_w = %format!("{:.1}", latest.avg_power_secondary),
            frt_on = frame.frt_on(),
            qe = %format!("{:.3e}", frame.inputs.qe),
            qe_opt = %format!("{:.3e}", frame.inputs.qe_opt_marker),
            colour = %frame.derived.colour,
            "[Render]"
        );
        SurfaceStatus::Open
    }

    fn surface_name(&self) -> &str {
        "log"
    }
}

/// Keeps every rendered frame; optionally closes after `close_after` frames.
#[derive(Debug, Clone, Default)]
pub struct RecordingSurface {
    frames: Arc<Mutex<Vec<Arc<Frame>>>>,
    close_after: Option<usize>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn closing_after(frames: usize) -> Self {
        Self {
            frames: Arc::default(),
            close_after: Some(frames),
        }
    }

    /// Frames rendered so far (shared with clones of this surface).
    pub fn frames(&self) -> Vec<Arc<Frame>> {
        self.frames
            .lock()
            .map(|f| f.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }
}

impl RenderSurface for RecordingSurface {
    fn render(&mut self, frame: &Frame) -> SurfaceStatus {
        let mut frames = self.frames.lock().unwrap_or_else(|e| e.into_inner());
        frames.push(Arc::new(frame.clone()));
        match self.close_after {
            Some(limit) if frames.len() >= limit => SurfaceStatus::Closed,
            _ => SurfaceStatus::Open,
        }
    }

    fn surface_name(&self) -> &str {
        "recording"
    }
}

/// Redraw the newest frame at a fixed interval until cancelled.
///
/// Frames published between two ticks are skipped; only the newest is drawn.
/// A surface reporting [`SurfaceStatus::Closed`] cancels the whole run.
/// Returns the number of frames drawn.
pub async fn run_render_loop<R: RenderSurface>(
    mut surface: R,
    mut frames: watch::Receiver<Option<Arc<Frame>>>,
    interval: Duration,
    cancel: CancellationToken,
) -> anyhow::Result<u64> {
    info!(
        "[Render] Drawing to '{}' every {:?}",
        surface.surface_name(),
        interval
    );
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut drawn = 0u64;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if !frames.has_changed().unwrap_or(false) {
            continue;
        }
        let frame = frames.borrow_and_update().clone();
        let Some(frame) = frame else { continue };

        drawn += 1;
        if surface.render(&frame) == SurfaceStatus::Closed {
            info!("[Render] Surface closed, shutting down");
            cancel.cancel();
            break;
        }
    }

    info!(frames = drawn, "[Render] Stopped");
    Ok(drawn)
}
