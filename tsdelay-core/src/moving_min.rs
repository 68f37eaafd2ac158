use std::collections::VecDeque;

/// A `(value, time)` sample retained by [`MovingMin`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinSample {
    pub value: f64,
    pub time: i64,
}

/// Streaming minimum of `(value, time)` pairs over a trailing window.
///
/// The deque holds samples with strictly increasing values whose times
/// all lie within the most recent window, so the front is always the
/// window minimum. Samples that are larger than the current tail and
/// arrive within one sub-window of it are discarded, bounding the
/// deque to `subdivisions` entries per window in the worst case.
///
/// The time axis is in timestamp ticks; with the common 1 ms tick the
/// default window is about 100 ms.
#[derive(Debug, Clone)]
pub struct MovingMin {
    samples: VecDeque<MinSample>,
    interval: i64,
    sub: i64,
    next_interval: i64,
}

impl Default for MovingMin {
    fn default() -> Self {
        Self::new()
    }
}

impl MovingMin {
    /// Window length in ticks of the time axis.
    pub const INTERVAL: i64 = 100;
    /// Sub-windows per window.
    pub const SUBDIVISIONS: i64 = 5;

    pub fn new() -> Self {
        Self::with_interval(Self::INTERVAL, Self::SUBDIVISIONS)
    }

    pub fn with_interval(interval: i64, subdivisions: i64) -> Self {
        Self {
            samples: VecDeque::new(),
            interval,
            sub: interval / subdivisions,
            next_interval: 0,
        }
    }

    pub fn add_sample(&mut self, value: f64, time: i64) {
        let new_min = self.samples.front().map_or(true, |f| value <= f.value);
        let whole_window_stale = self
            .samples
            .back()
            .map_or(false, |b| time > b.time + self.interval);
        if new_min || whole_window_stale {
            self.samples.clear();
            self.samples.push_back(MinSample { value, time });
            return;
        }

        // drop the prefix that has fallen out of the window
        while self
            .samples
            .front()
            .map_or(false, |f| f.time + self.interval < time)
        {
            self.samples.pop_front();
        }

        // the new-min case above guarantees a survivor at the back
        let back = *self.samples.back().expect("window cannot be empty here");
        if value > back.value {
            if time > back.time + self.sub {
                self.samples.push_back(MinSample { value, time });
            }
            return;
        }

        // the sample beats a suffix of the deque: values are strictly
        // increasing, so pop until the first entry it does not beat
        while self.samples.back().map_or(false, |b| value <= b.value) {
            self.samples.pop_back();
        }
        self.samples.push_back(MinSample { value, time });
    }

    /// The minimum over the current window.
    pub fn interval_min(&self) -> Option<MinSample> {
        self.samples.front().copied()
    }

    /// True whenever `time` has crossed into a new interval since the
    /// last crossing.
    pub fn new_interval(&mut self, time: i64) -> bool {
        if time < self.next_interval {
            return false;
        }
        while self.next_interval <= time {
            self.next_interval += self.interval;
        }
        true
    }

    /// Arm the interval clock so the first crossing happens one whole
    /// interval after `start`.
    pub fn set_first_interval(&mut self, start: i64) {
        self.next_interval = start + self.interval;
    }
}
