use log::warn;

use crate::{
    flow_table::FlowTable,
    match_table::MatchTable,
    segment::{FlowKey, TcpSegment},
    settings::{Settings, SettingsError},
    stats::{Counters, Reject, SummaryReport},
};

/// One emitted measurement record.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Capture time relative to the capture origin.
    pub cap_tm: f64,
    /// Wall-clock second of the capture, `floor(cap_tm) + origin`.
    pub epoch_sec: i64,
    /// Passive-ping RTT, on return-ping packets only.
    pub rtt: Option<f64>,
    /// Smallest RTT seen for the flow, reported alongside `rtt`.
    pub min_rtt: Option<f64>,
    /// Bytes seen from this flow so far.
    pub bytes: u64,
    /// `[dst->sender, sender->CP, dst->sender->CP]` added delays.
    pub dv: [Option<f64>; 3],
    pub flow: FlowKey,
}

/// Drives per-segment ingest across the flow and match tables and
/// owns the capture-time origin, the reject counters and the sweep
/// and summary schedules.
///
/// All state lives here; there are no process-wide singletons. The
/// packet source calls [`handle_segment`](Self::handle_segment) or
/// [`reject`](Self::reject) exactly once per captured packet, then
/// [`check_timers`](Self::check_timers) to run whatever duties the
/// capture clock has made due.
#[derive(Debug)]
pub struct Dispatcher {
    settings: Settings,
    flows: FlowTable,
    matches: MatchTable,
    counters: Counters,
    total_packets: u64,
    /// Whole-second origin of the capture clock, set by the first
    /// accepted packet. Keeping times relative to it leaves plenty of
    /// headroom in an f64 mantissa for microsecond resolution.
    off_tm: Option<i64>,
    /// Fraction of a second between the origin and the first packet.
    startm: f64,
    /// Latest relative capture time.
    cap_tm: f64,
    next_sum: f64,
    next_clean: f64,
}

impl Dispatcher {
    pub fn new(settings: Settings) -> Result<Self, SettingsError> {
        settings.validate()?;
        let max_flows = settings.max_flows;
        Ok(Self {
            settings,
            flows: FlowTable::new(max_flows),
            matches: MatchTable::new(),
            counters: Counters::default(),
            total_packets: 0,
            off_tm: None,
            startm: 0.0,
            cap_tm: 0.0,
            next_sum: 0.0,
            next_clean: 0.0,
        })
    }

    /// Count a packet the source could not decode into a segment.
    pub fn reject(&mut self, reject: Reject) {
        self.total_packets += 1;
        self.counters.packets += 1;
        self.counters.count(reject);
    }

    /// Ingest one decoded segment, returning a record when the packet
    /// produced a passive ping or at least one delay variation.
    pub fn handle_segment(&mut self, segment: &TcpSegment) -> Option<Record> {
        self.total_packets += 1;
        self.counters.packets += 1;

        // a zero TSval carries no clock; a zero echo outside the
        // handshake means the option is not being negotiated
        if segment.tsval == 0 || (segment.ecr == 0 && !segment.syn) {
            return None;
        }

        let tm = self.relative_time(segment.cap_tm);
        self.cap_tm = tm;

        let peer_clock = self.flows.peer_clock(&segment.key);
        let flow = self
            .flows
            .upsert(segment.key, tm, segment.tsval)?;
        let ingested = flow.ingest(tm, segment.wire_len, segment.tsval, segment.ecr, peer_clock);
        let paired = flow.paired();
        let bytes = flow.bytes();

        let rtt = if paired {
            self.matches.match_and_invalidate(
                segment.key.reverse(),
                segment.ecr,
                tm,
                self.settings.tsval_max_age,
            )
        } else {
            self.counters.uni_dir += 1;
            None
        };
        // track the TSval regardless of pairing, unless the ping
        // would terminate at a local host application
        if self.settings.local_addr != Some(segment.key.dst) {
            self.matches.insert_if_absent(segment.key, segment.tsval, tm);
        }

        let epoch_sec = self.off_tm.unwrap_or(0) + tm.floor() as i64;
        if let Some(rtt) = rtt {
            // a return ping for this flow
            let Some(flow) = self.flows.get_mut(&segment.key) else {
                warn!("flow {} vanished mid-dispatch", segment.key);
                return None;
            };
            flow.note_rtt(rtt, ingested.ts, tm);
            Some(Record {
                cap_tm: tm,
                epoch_sec,
                rtt: Some(rtt),
                min_rtt: flow.min_rtt(),
                bytes,
                dv: ingested.dv,
                flow: segment.key,
            })
        } else if ingested.any_dv() {
            Some(Record {
                cap_tm: tm,
                epoch_sec,
                rtt: None,
                min_rtt: None,
                bytes,
                dv: ingested.dv,
                flow: segment.key,
            })
        } else {
            None
        }
    }

    /// Run the aging sweeps and the summary schedule against the
    /// capture clock. Returns a report when one is due.
    pub fn check_timers(&mut self) -> Option<SummaryReport> {
        self.off_tm?;

        if self.cap_tm >= self.next_clean {
            self.matches.sweep(self.cap_tm, self.settings.tsval_max_age);
            self.flows.sweep(self.cap_tm, self.settings.flow_max_idle);
            self.next_clean = self.cap_tm + self.settings.tsval_max_age;
        }

        if self.settings.summary_interval > 0.0 && self.cap_tm >= self.next_sum {
            let armed = self.next_sum > 0.0;
            self.next_sum = self.cap_tm + self.settings.summary_interval;
            if armed {
                let report = self.summary();
                self.counters.reset();
                return Some(report);
            }
        }
        None
    }

    /// The current counters without resetting them, for a final
    /// report.
    pub fn summary(&self) -> SummaryReport {
        SummaryReport {
            flows: self.flows.len(),
            counters: self.counters.clone(),
        }
    }

    /// Whole-second origin of the capture clock, once known.
    pub fn origin(&self) -> Option<i64> {
        self.off_tm
    }

    /// Capture seconds elapsed since the first accepted packet.
    pub fn elapsed(&self) -> f64 {
        self.cap_tm - self.startm
    }

    /// Packets seen in total, accepted or rejected.
    pub fn total_packets(&self) -> u64 {
        self.total_packets
    }

    pub fn flow_count(&self) -> usize {
        self.flows.len()
    }

    fn relative_time(&mut self, epoch: f64) -> f64 {
        match self.off_tm {
            Some(origin) => epoch - origin as f64,
            None => {
                let origin = epoch.floor() as i64;
                self.off_tm = Some(origin);
                self.startm = epoch - origin as f64;
                self.startm
            }
        }
    }
}

#[cfg(test)]
mod dispatcher {
    use super::*;

    fn key() -> FlowKey {
        FlowKey {
            src: "10.0.0.1".parse().unwrap(),
            sport: 1,
            dst: "10.0.0.2".parse().unwrap(),
            dport: 2,
        }
    }

    fn segment(cap_tm: f64, key: FlowKey, tsval: u32, ecr: u32, syn: bool) -> TcpSegment {
        TcpSegment {
            cap_tm,
            wire_len: 60,
            key,
            tsval,
            ecr,
            syn,
        }
    }

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(Settings::default()).unwrap()
    }

    #[test]
    fn zero_tsval_is_discarded() {
        let mut d = dispatcher();
        assert_eq!(d.handle_segment(&segment(0.0, key(), 0, 5, false)), None);
        assert_eq!(d.flow_count(), 0);
        // still counted as a packet
        assert_eq!(d.total_packets(), 1);
    }

    #[test]
    fn zero_ecr_needs_syn() {
        let mut d = dispatcher();
        assert_eq!(d.handle_segment(&segment(0.0, key(), 100, 0, false)), None);
        assert_eq!(d.flow_count(), 0);
        d.handle_segment(&segment(0.0, key(), 100, 0, true));
        assert_eq!(d.flow_count(), 1);
    }

    #[test]
    fn reverse_ping_is_matched_once() {
        let mut d = dispatcher();
        assert_eq!(d.handle_segment(&segment(0.0, key(), 100, 0, true)), None);

        let reply = d
            .handle_segment(&segment(0.010, key().reverse(), 500, 100, false))
            .expect("a return ping emits a record");
        assert_eq!(reply.rtt, Some(0.010));
        assert_eq!(reply.min_rtt, Some(0.010));
        assert_eq!(reply.flow, key().reverse());
        assert_eq!(reply.flow.to_string(), "10.0.0.2:2+10.0.0.1:1");

        // the same echo cannot match again
        assert_eq!(
            d.handle_segment(&segment(0.020, key().reverse(), 500, 100, false)),
            None
        );
    }

    #[test]
    fn local_destination_is_not_tracked() {
        let settings = Settings {
            local_addr: Some("10.0.0.2".parse().unwrap()),
            ..Settings::default()
        };
        let mut d = Dispatcher::new(settings).unwrap();
        // the tsval of a flow toward the local address is not recorded
        d.handle_segment(&segment(0.0, key(), 100, 0, true));
        assert_eq!(
            d.handle_segment(&segment(0.25, key().reverse(), 500, 100, false)),
            None
        );
        // the reverse flow heads away from the local address, so its
        // tsval was recorded and can be matched
        let forward = d.handle_segment(&segment(0.75, key(), 300, 500, false));
        assert!(forward.is_some_and(|r| r.rtt == Some(0.5)));
    }

    #[test]
    fn rejects_feed_the_summary_counters() {
        let mut d = dispatcher();
        d.reject(Reject::NotTcp);
        d.reject(Reject::NoTimestamp);
        d.reject(Reject::NoTimestamp);
        let summary = d.summary();
        assert_eq!(summary.counters.packets, 3);
        assert_eq!(summary.counters.not_tcp, 1);
        assert_eq!(summary.counters.no_ts, 2);
        assert_eq!(summary.counters.not_v4or6, 0);
    }

    #[test]
    fn summary_schedule_arms_then_fires() {
        let mut d = dispatcher();
        d.handle_segment(&segment(1000.25, key(), 100, 0, true));
        // first crossing only arms the schedule
        assert_eq!(d.check_timers(), None);

        d.handle_segment(&segment(1011.0, key(), 200, 1, false));
        let report = d.check_timers().expect("one interval elapsed");
        assert_eq!(report.counters.packets, 2);
        assert_eq!(report.flows, 1);

        // counters reset after the report
        assert_eq!(d.summary().counters.packets, 0);
    }

    #[test]
    fn origin_is_the_first_accepted_packet() {
        let mut d = dispatcher();
        assert_eq!(d.origin(), None);
        d.reject(Reject::NotTcp);
        assert_eq!(d.origin(), None);
        let r = d
            .handle_segment(&segment(1000.25, key(), 100, 0, true))
            .is_none();
        assert!(r);
        assert_eq!(d.origin(), Some(1000));
    }

    #[test]
    fn records_carry_wall_clock_seconds() {
        let mut d = dispatcher();
        d.handle_segment(&segment(1000.25, key(), 100, 0, true));
        let reply = d
            .handle_segment(&segment(1002.5, key().reverse(), 500, 100, false))
            .unwrap();
        assert_eq!(reply.epoch_sec, 1002);
        assert!((reply.cap_tm - 2.5).abs() < 1e-9);
    }
}
