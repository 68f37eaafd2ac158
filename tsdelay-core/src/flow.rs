use crate::{
    clock::{ClockEstimator, FlowClock},
    extend::TimestampExtender,
};

/// What one ingested segment contributed: its extended timestamps and
/// any delay variations it produced.
#[derive(Debug, Clone, Copy)]
pub struct Ingested {
    /// Extended TSval.
    pub ts: i64,
    /// Extended echo reply.
    pub ecr: i64,
    /// `[dst->sender, sender->CP, dst->sender->CP]` added delays.
    pub dv: [Option<f64>; 3],
}

impl Ingested {
    pub fn any_dv(&self) -> bool {
        self.dv.iter().any(Option::is_some)
    }
}

/// Per-direction flow state: counters, timestamp extenders, the
/// minimum-RTT marks and the sender clock estimate.
#[derive(Debug)]
pub struct FlowRecord {
    paired: bool,
    packets: u64,
    bytes: u64,
    last_tm: f64,
    tsval_extender: TimestampExtender,
    ecr_extender: TimestampExtender,
    min_rtt: f64,
    /// Extended TSval of the packet that produced `min_rtt`.
    min_ts: i64,
    /// Capture time of that packet.
    min_tm: f64,
    clock: ClockEstimator,
}

impl FlowRecord {
    pub fn new(cap_tm: f64, tsval: u32) -> Self {
        let mut tsval_extender = TimestampExtender::new();
        let start_ts = tsval_extender.extend(tsval);
        Self {
            paired: false,
            packets: 0,
            bytes: 0,
            last_tm: cap_tm,
            tsval_extender,
            ecr_extender: TimestampExtender::new(),
            min_rtt: f64::INFINITY,
            min_ts: 0,
            min_tm: 0.0,
            clock: ClockEstimator::new(cap_tm, start_ts),
        }
    }

    /// Account a segment: counters, timestamp extension, clock update
    /// and delay-variation computation.
    ///
    /// `peer_clock` is the reverse direction's committed clock, when
    /// that flow exists and has one; the caller snapshots it before
    /// the mutable borrow of this record.
    pub fn ingest(
        &mut self,
        tm: f64,
        wire_len: u32,
        tsval: u32,
        ecr: u32,
        peer_clock: Option<FlowClock>,
    ) -> Ingested {
        self.last_tm = tm;
        self.packets += 1;
        self.bytes += u64::from(wire_len);
        let ts = self.tsval_extender.extend(tsval);
        let ecr = self.ecr_extender.extend(ecr);

        let min_mark = self.min_rtt.is_finite().then(|| (self.min_ts, self.min_tm));
        self.clock.update(tm, ts, self.packets, min_mark);
        let dv = self.compute_dv(tm, ts, ecr, peer_clock);

        Ingested { ts, ecr, dv }
    }

    /// Delay variations for a packet at capture time `tm`:
    ///
    /// - `dv[1]`, sender to capture point, needs this flow's clock;
    /// - `dv[2]`, destination through the sender to the capture
    ///   point, needs the peer's clock and a destination send time
    ///   that does not lie in the future;
    /// - `dv[0]`, destination to sender, needs both.
    fn compute_dv(
        &self,
        tm: f64,
        ts: i64,
        ecr: i64,
        peer_clock: Option<FlowClock>,
    ) -> [Option<f64>; 3] {
        let mut dv = [None; 3];

        let src_tm = self.clock.clock().map(|clock| {
            // a source estimate after the capture means zero queue,
            // not time travel
            let src_tm = clock.source_time(ts).min(tm);
            dv[1] = Some(tm - src_tm);
            src_tm
        });

        let Some(peer) = peer_clock else { return dv };
        let dst_tm = peer.source_time(ecr);
        if dst_tm > tm {
            return dv;
        }
        dv[2] = Some(tm - dst_tm);
        if let Some(src_tm) = src_tm {
            dv[0] = Some(src_tm - dst_tm);
        }
        dv
    }

    /// Fold in a passive-ping sample, keeping the best (smallest).
    pub fn note_rtt(&mut self, rtt: f64, ts: i64, tm: f64) {
        if rtt < self.min_rtt {
            self.min_rtt = rtt;
            self.min_ts = ts;
            self.min_tm = tm;
        }
    }

    /// The smallest passive-ping RTT seen so far, once one exists.
    pub fn min_rtt(&self) -> Option<f64> {
        self.min_rtt.is_finite().then_some(self.min_rtt)
    }

    pub fn clock(&self) -> Option<FlowClock> {
        self.clock.clock()
    }

    pub fn paired(&self) -> bool {
        self.paired
    }

    pub fn set_paired(&mut self, paired: bool) {
        self.paired = paired;
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn packets(&self) -> u64 {
        self.packets
    }

    pub fn last_tm(&self) -> f64 {
        self.last_tm
    }
}
