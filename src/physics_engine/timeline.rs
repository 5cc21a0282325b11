//! Monotonic time axis across dataset wraparound.
//!
//! The sample source replays one finite trace forever. Each time the raw
//! timestamp fails to increase, a full pass has completed and the pass
//! duration is added to a running offset, so emitted time never goes back.
//!
//! A pass duration too short to clear the previous pass is stretched so the
//! first sample of the new pass lands one sample step after the last one.

#[derive(Debug, Clone)]
pub struct TimeUnwrapper {
    pass_duration: f64,
    offset: f64,
    previous_raw: Option<f64>,
    last_step: f64,
    wraps: u64,
    stretched_wraps: u64,
}

impl TimeUnwrapper {
    pub fn new(pass_duration: f64) -> Self {
        Self {
            pass_duration: pass_duration.max(0.0),
            offset: 0.0,
            previous_raw: None,
            last_step: 0.0,
            wraps: 0,
            stretched_wraps: 0,
        }
    }

    /// Map a raw dataset timestamp onto the unwrapped axis.
    ///
    /// Strictly increasing as long as the pass duration or the last sample
    /// step is positive.
    pub fn unwrap(&mut self, raw_time: f64) -> f64 {
        if let Some(prev) = self.previous_raw {
            if raw_time <= prev {
                let minimum = prev - raw_time + self.last_step;
                if self.pass_duration < minimum {
                    self.stretched_wraps += 1;
                }
                self.offset += self.pass_duration.max(minimum);
                self.wraps += 1;
            } else {
                self.last_step = raw_time - prev;
            }
        }
        self.previous_raw = Some(raw_time);
        raw_time + self.offset
    }

    /// Number of wraparounds seen so far.
    pub fn wraps(&self) -> u64 {
        self.wraps
    }

    /// Wraps where the pass duration had to be stretched.
    pub fn stretched_wraps(&self) -> u64 {
        self.stretched_wraps
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }
}

/// Duration of one pass through a time-ordered trace.
///
/// Last minus first timestamp plus the mean spacing, so the first replayed
/// sample lands one step after the last sample of the previous pass.
/// Zero for fewer than two samples.
pub fn measured_pass_duration(times: &[f64]) -> f64 {
    match times {
        [] | [_] => 0.0,
        [first, .., last] => {
            let span = last - first;
            span + span / (times.len() - 1) as f64
        }
    }
}
