//! Per-section duration statistics for a single worker lifecycle.
//!
//! A [`Recorder`] is owned single-threaded by one running [`Worker`][worker]
//! and makes no concurrency claims of its own - it is not concerned with
//! concurrent mutation across threads. It crosses a
//! process boundary the same way any other value does: it derives
//! `Serialize`/`Deserialize` so a child can ship its final timings back to
//! the parent inside a `ResultEnvelope`.
//!
//! [worker]: https://docs.rs/suitkaise-worker

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// One named section of the worker lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Section {
    PreRun,
    Run,
    PostRun,
    OnFinish,
    Result,
    Error,
    FullRun,
}

impl Section {
    pub const ALL: [Section; 7] = [
        Section::PreRun,
        Section::Run,
        Section::PostRun,
        Section::OnFinish,
        Section::Result,
        Section::Error,
        Section::FullRun,
    ];
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct Bucket {
    samples: Vec<f64>,
}

impl Bucket {
    fn count(&self) -> usize {
        self.samples.len()
    }

    fn mean(&self) -> Option<f64> {
        if self.samples.is_empty() {
            None
        } else {
            Some(self.samples.iter().sum::<f64>() / self.samples.len() as f64)
        }
    }

    fn min(&self) -> Option<f64> {
        self.samples.iter().cloned().fold(None, |acc, v| match acc {
            None => Some(v),
            Some(m) => Some(m.min(v)),
        })
    }

    fn max(&self) -> Option<f64> {
        self.samples.iter().cloned().fold(None, |acc, v| match acc {
            None => Some(v),
            Some(m) => Some(m.max(v)),
        })
    }

    fn total(&self) -> f64 {
        self.samples.iter().sum()
    }

    fn most_recent(&self) -> Option<f64> {
        self.samples.last().copied()
    }

    /// Linear-interpolated percentile, `0 <= p <= 100`.
    fn percentile(&self, p: f64) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let mut sorted = self.samples.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).expect("samples must not be NaN"));
        let n = sorted.len();
        if n == 1 {
            return Some(sorted[0]);
        }
        let k = (p / 100.0) * (n - 1) as f64;
        let lo = k.floor() as usize;
        let hi = k.ceil() as usize;
        let frac = k - k.floor();
        Some(sorted[lo] * (1.0 - frac) + sorted[hi] * frac)
    }
}

/// Records `start`/`stop` measurements per named [`Section`] and answers
/// summary-statistic queries over the accumulated samples.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Recorder {
    buckets: HashMap<Section, Bucket>,
    #[serde(skip)]
    in_flight: HashMap<Section, Vec<Instant>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin timing `section`. Sections may nest (a stack per section): each
    /// `stop` pops and appends the innermost still-open measurement, so a
    /// nested start/stop pair records its own sample independently of the
    /// one enclosing it.
    pub fn start(&mut self, section: Section) {
        self.in_flight.entry(section).or_default().push(Instant::now());
    }

    /// Stop timing `section`, appending the elapsed duration (in seconds) as
    /// a sample. Panics if `start` was not called first - a programming
    /// error, not a runtime condition workers should need to handle.
    pub fn stop(&mut self, section: Section) -> f64 {
        let started = self
            .in_flight
            .get_mut(&section)
            .and_then(|stack| stack.pop())
            .expect("stop called without a matching start");
        let elapsed = started.elapsed().as_secs_f64();
        self.append(section, elapsed);
        elapsed
    }

    /// Abandon the in-flight measurement for `section` without recording a
    /// sample - used when the section raised or timed out.
    pub fn discard(&mut self, section: Section) {
        if let Some(stack) = self.in_flight.get_mut(&section) {
            stack.pop();
        }
    }

    /// Inject a duration directly, bypassing start/stop.
    pub fn append(&mut self, section: Section, duration: f64) {
        self.buckets.entry(section).or_default().samples.push(duration);
    }

    /// Append `pre_run + run + post_run`'s most recent samples as one
    /// `FullRun` sample, the per-iteration aggregation a completed run commits.
    pub fn commit_full_run(&mut self) {
        let pre = self.most_recent(Section::PreRun).unwrap_or(0.0);
        let run = self.most_recent(Section::Run).unwrap_or(0.0);
        let post = self.most_recent(Section::PostRun).unwrap_or(0.0);
        self.append(Section::FullRun, pre + run + post);
    }

    pub fn count(&self, section: Section) -> usize {
        self.buckets.get(&section).map(Bucket::count).unwrap_or(0)
    }

    pub fn mean(&self, section: Section) -> Option<f64> {
        self.buckets.get(&section).and_then(Bucket::mean)
    }

    pub fn min(&self, section: Section) -> Option<f64> {
        self.buckets.get(&section).and_then(Bucket::min)
    }

    pub fn max(&self, section: Section) -> Option<f64> {
        self.buckets.get(&section).and_then(Bucket::max)
    }

    pub fn total(&self, section: Section) -> f64 {
        self.buckets.get(&section).map(Bucket::total).unwrap_or(0.0)
    }

    pub fn most_recent(&self, section: Section) -> Option<f64> {
        self.buckets.get(&section).and_then(Bucket::most_recent)
    }

    pub fn percentile(&self, section: Section, p: f64) -> Option<f64> {
        assert!((0.0..=100.0).contains(&p), "percentile must be in [0, 100]");
        self.buckets.get(&section).and_then(|b| b.percentile(p))
    }

    pub fn samples(&self, section: Section) -> &[f64] {
        self.buckets
            .get(&section)
            .map(|b| b.samples.as_slice())
            .unwrap_or(&[])
    }
}

/// Convenience RAII guard: times a section for the lifetime of the guard,
/// recording on drop unless [`SectionGuard::discard`] was called first.
pub struct SectionGuard<'a> {
    recorder: &'a mut Recorder,
    section: Section,
    discarded: bool,
}

impl<'a> SectionGuard<'a> {
    pub fn new(recorder: &'a mut Recorder, section: Section) -> Self {
        recorder.start(section);
        Self {
            recorder,
            section,
            discarded: false,
        }
    }

    pub fn discard(mut self) {
        self.discarded = true;
        self.recorder.discard(self.section);
    }
}

impl Drop for SectionGuard<'_> {
    fn drop(&mut self) {
        if !self.discarded {
            self.recorder.stop(self.section);
        }
    }
}

#[allow(dead_code)]
fn assert_duration_is_non_negative(d: Duration) -> Duration {
    d
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_query_basic_stats() {
        let mut r = Recorder::new();
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            r.append(Section::Run, v);
        }
        assert_eq!(r.count(Section::Run), 5);
        assert_eq!(r.mean(Section::Run), Some(3.0));
        assert_eq!(r.min(Section::Run), Some(1.0));
        assert_eq!(r.max(Section::Run), Some(5.0));
        assert_eq!(r.total(Section::Run), 15.0);
        assert_eq!(r.most_recent(Section::Run), Some(5.0));
    }

    #[test]
    fn percentile_interpolates_linearly() {
        let mut r = Recorder::new();
        for v in [10.0, 20.0, 30.0, 40.0] {
            r.append(Section::Run, v);
        }
        // k = 0.5 * 3 = 1.5 -> samples[1]*0.5 + samples[2]*0.5 = 20*0.5+30*0.5 = 25
        assert_eq!(r.percentile(Section::Run, 50.0), Some(25.0));
        assert_eq!(r.percentile(Section::Run, 0.0), Some(10.0));
        assert_eq!(r.percentile(Section::Run, 100.0), Some(40.0));
    }

    #[test]
    fn start_stop_records_elapsed_time() {
        let mut r = Recorder::new();
        r.start(Section::Run);
        std::thread::sleep(Duration::from_millis(5));
        let elapsed = r.stop(Section::Run);
        assert!(elapsed > 0.0);
        assert_eq!(r.count(Section::Run), 1);
    }

    #[test]
    fn discard_drops_in_flight_measurement() {
        let mut r = Recorder::new();
        r.start(Section::Run);
        r.discard(Section::Run);
        assert_eq!(r.count(Section::Run), 0);
    }

    #[test]
    fn commit_full_run_sums_same_index_entries() {
        let mut r = Recorder::new();
        r.append(Section::PreRun, 1.0);
        r.append(Section::Run, 2.0);
        r.append(Section::PostRun, 3.0);
        r.commit_full_run();
        assert_eq!(r.most_recent(Section::FullRun), Some(6.0));
    }

    #[test]
    fn nested_sections_time_from_outermost_start() {
        let mut r = Recorder::new();
        r.start(Section::Run);
        r.start(Section::Run);
        r.stop(Section::Run); // inner stop
        r.stop(Section::Run); // outer stop
        assert_eq!(r.count(Section::Run), 2);
    }

    #[test]
    fn section_guard_records_on_drop() {
        let mut r = Recorder::new();
        {
            let _guard = SectionGuard::new(&mut r, Section::PreRun);
        }
        assert_eq!(r.count(Section::PreRun), 1);
    }

    #[test]
    fn section_guard_discard_skips_recording() {
        let mut r = Recorder::new();
        {
            let guard = SectionGuard::new(&mut r, Section::PreRun);
            guard.discard();
        }
        assert_eq!(r.count(Section::PreRun), 0);
    }

    #[test]
    fn recorder_round_trips_through_serde() {
        let mut r = Recorder::new();
        r.append(Section::Run, 1.5);
        let bytes = bincode::serialize(&r).unwrap();
        let back: Recorder = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back.count(Section::Run), 1);
        assert_eq!(back.most_recent(Section::Run), Some(1.5));
    }
}

#[cfg(test)]
mod percentile_properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// `percentile(0)`/`percentile(100)` always land on the sample
        /// extremes, and every percentile in between stays within them,
        /// regardless of how the samples arrived.
        #[test]
        fn percentile_is_bounded_by_min_and_max(
            samples in proptest::collection::vec(-1.0e6f64..1.0e6, 1..64),
            p in 0.0f64..=100.0,
        ) {
            let mut r = Recorder::new();
            for s in &samples {
                r.append(Section::Run, *s);
            }
            let lo = samples.iter().cloned().fold(f64::INFINITY, f64::min);
            let hi = samples.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let value = r.percentile(Section::Run, p).unwrap();
            prop_assert!(value >= lo - 1e-9 && value <= hi + 1e-9);
        }

        /// `percentile(0) == min` and `percentile(100) == max` exactly.
        #[test]
        fn percentile_extremes_match_min_and_max(
            samples in proptest::collection::vec(-1.0e6f64..1.0e6, 1..64),
        ) {
            let mut r = Recorder::new();
            for s in &samples {
                r.append(Section::Run, *s);
            }
            prop_assert_eq!(r.percentile(Section::Run, 0.0), r.min(Section::Run));
            prop_assert_eq!(r.percentile(Section::Run, 100.0), r.max(Section::Run));
        }
    }
}
