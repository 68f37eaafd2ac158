/// Lifts a stream of wrap-prone 32-bit timestamp values into monotone
/// 64-bit ones.
///
/// TCP timestamp values are free-running 32-bit counters that wrap
/// roughly every 2^32 ticks. Two offset slots are kept so that a
/// slightly-late packet still carrying the pre-wrap high bit extends
/// against the old offset instead of jumping a full period ahead.
#[derive(Debug, Default, Clone)]
pub struct TimestampExtender {
    offset: [i64; 2],
    last: u32,
}

impl TimestampExtender {
    /// One full period of the 32-bit counter.
    const WRAP: i64 = 1 << 32;

    pub fn new() -> Self {
        Self::default()
    }

    /// Extend `ts` into 64 bits, tracking wrap state.
    ///
    /// Correct across one wrap per 2^31 ticks of forward progress.
    /// The extender must not be reset while its flow is alive, or
    /// previously returned values would repeat.
    pub fn extend(&mut self, ts: u32) -> i64 {
        // wrapped: the high bit was set last time and is clear now
        if (self.last & !ts) >> 31 != 0 {
            self.offset[1] = self.offset[0];
            self.offset[0] += Self::WRAP;
        }
        self.last = ts;
        self.offset[(ts >> 31) as usize] + i64::from(ts)
    }
}
