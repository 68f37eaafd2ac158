use log::debug;

use crate::moving_min::MovingMin;

/// Committed clock parameters for one flow direction.
///
/// `zero_ts`/`zero_tm` approximate a moment of zero queueing delay at
/// the sender; `sp_ts` converts timestamp ticks into seconds. Together
/// they map any later TSval to an estimated send time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowClock {
    /// Seconds per timestamp tick.
    pub sp_ts: f64,
    /// Extended TSval at the zero-queue reference point.
    pub zero_ts: i64,
    /// Capture time of the reference point.
    pub zero_tm: f64,
}

impl FlowClock {
    /// Estimated send time of a packet carrying the extended
    /// timestamp `ts`.
    pub fn source_time(&self, ts: i64) -> f64 {
        (ts - self.zero_ts) as f64 * self.sp_ts + self.zero_tm
    }
}

/// A vertex on the lower hull, in flow-origin-adjusted coordinates.
#[derive(Debug, Clone, Copy)]
struct HullPoint {
    ts: i64,
    tm: f64,
}

/// `cross(O, A, B) > 0` iff `B` lies above the line `O -> A`.
fn cross(o: HullPoint, a: HullPoint, b: HullPoint) -> f64 {
    (a.ts - o.ts) as f64 * (b.tm - o.tm) - (a.tm - o.tm) * (b.ts - o.ts) as f64
}

/// Estimates the sender's TSval-to-wall-clock rate for one flow.
///
/// Per-interval minima of the `(ts, tm)` point cloud approximate the
/// lowest propagation delay at each time, so a lower convex hull over
/// them supports slopes near zero-queue conditions. The slope of the
/// longest hull segment is taken as the candidate tick rate; it is
/// committed only when it rounds to a whole number of milliseconds
/// within a small skew, which is how TSval clocks behave on common
/// stacks.
#[derive(Debug)]
pub struct ClockEstimator {
    start_tm: f64,
    start_ts: i64,
    mm: MovingMin,
    /// Lower hull, keeping collinear interior vertices.
    lh_pts: Vec<HullPoint>,
    last_unique_ts: Option<i64>,
    sp_ts: f64,
    zero_ts: i64,
    zero_tm: f64,
    clk_set: bool,
}

impl ClockEstimator {
    /// Intervals to observe before the first slope decision.
    const MIN_INTERVALS: i64 = 3;
    /// Packets to observe before the first slope decision.
    const MIN_PACKETS: u64 = 20;
    /// Largest tolerated relative deviation from a whole-millisecond
    /// tick; beyond this the apparent clock would bias delay
    /// variation by more than ~0.5%.
    const MAX_SKEW: f64 = 0.005;

    pub fn new(start_tm: f64, start_ts: i64) -> Self {
        let mut mm = MovingMin::new();
        // samples are origin-adjusted, so the interval clock starts at 0
        mm.set_first_interval(0);
        Self {
            start_tm,
            start_ts,
            mm,
            lh_pts: Vec::new(),
            last_unique_ts: None,
            sp_ts: 0.0,
            zero_ts: 0,
            zero_tm: 0.0,
            clk_set: false,
        }
    }

    /// The committed clock, if one is currently established.
    pub fn clock(&self) -> Option<FlowClock> {
        self.clk_set.then_some(FlowClock {
            sp_ts: self.sp_ts,
            zero_ts: self.zero_ts,
            zero_tm: self.zero_tm,
        })
    }

    /// Feed one `(capture time, extended TSval)` sample.
    ///
    /// `packets` is the flow's packet count so far; `min_mark` is the
    /// `(extended TSval, capture time)` of the packet that produced
    /// the flow's current minimum RTT, when one exists. Returns
    /// whether a clock is established after this sample.
    pub fn update(&mut self, tm: f64, ts: i64, packets: u64, min_mark: Option<(i64, f64)>) -> bool {
        // only the first appearance of each TSval carries timing
        if self.last_unique_ts.map_or(false, |last| ts <= last) {
            return self.clk_set;
        }
        self.last_unique_ts = Some(ts);

        let tm = tm - self.start_tm;
        let ts = ts - self.start_ts;

        // the segment list drops vertices collinear with the new
        // point; the persistent hull keeps them so that short flat
        // stretches still count toward the size gate
        let mut segs = self.lh_pts.clone();
        self.mm.add_sample(tm, ts);
        if !self.mm.new_interval(ts) {
            return self.clk_set;
        }
        let Some(min) = self.mm.interval_min() else {
            return self.clk_set;
        };
        let p = HullPoint {
            ts: min.time,
            tm: min.value,
        };
        while self.lh_pts.len() >= 2
            && cross(
                self.lh_pts[self.lh_pts.len() - 2],
                self.lh_pts[self.lh_pts.len() - 1],
                p,
            ) < 0.0
        {
            self.lh_pts.pop();
        }
        self.lh_pts.push(p);
        while segs.len() >= 2 && cross(segs[segs.len() - 2], segs[segs.len() - 1], p) <= 0.0 {
            segs.pop();
        }
        segs.push(p);

        if ts < Self::MIN_INTERVALS * MovingMin::INTERVAL
            || self.lh_pts.len() < 2
            || packets < Self::MIN_PACKETS
        {
            return self.clk_set;
        }

        // the longest segment spans the most hull evidence; its end
        // vertex is the candidate zero-queue reference
        let mut longest = 0;
        let mut li = 0;
        for i in 1..segs.len() {
            let gap = segs[i].ts - segs[i - 1].ts;
            if gap >= longest {
                longest = gap;
                li = i;
            }
        }
        let end = segs[li];

        if self.start_ts + end.ts == self.zero_ts {
            // same interval as the committed reference; a newer
            // minimum-RTT packet is an even better zero-queue witness
            if let Some((min_ts, min_tm)) = min_mark {
                if min_ts > self.zero_ts {
                    self.zero_ts = min_ts;
                    self.zero_tm = min_tm;
                }
            }
            return self.clk_set;
        }

        let prev = segs[li - 1];
        let m = (end.tm - prev.tm) / (end.ts - prev.ts) as f64;
        let spt = (m * 1000.0).round() / 1000.0;
        if spt == 0.0 {
            self.clk_set = false;
            return false;
        }
        let skew = (m - spt).abs();
        if skew / spt > Self::MAX_SKEW {
            // in case it was looking usable, switch off
            self.clk_set = false;
            return false;
        }

        if !self.clk_set {
            debug!("clock established: {spt} s/tick");
        }
        self.sp_ts = spt;
        self.zero_ts = self.start_ts + end.ts;
        self.zero_tm = self.start_tm + end.tm;
        self.clk_set = true;
        true
    }
}
