//! Passive delay estimation for TCP flows observed at a capture
//! point.
//!
//! The crate consumes a stream of decoded TCP segments carrying the
//! RFC 7323 Timestamp option and produces two kinds of per-packet
//! delay estimates:
//!
//! - **passive ping**: the round-trip time between the capture point
//!   and a host, found by matching a TSval seen in one direction with
//!   the echo reply of a later packet in the reverse direction;
//! - **delay variation**: queueing delay beyond the observed minimum,
//!   derived from an on-line estimate of each sender's TSval tick
//!   rate.
//!
//! Everything is driven by capture time; there is no I/O and no
//! threading in here. Feed a [`Dispatcher`] one segment at a time and
//! print what it returns.

pub mod clock;
pub mod dispatcher;
pub mod extend;
pub mod flow;
pub mod flow_table;
pub mod match_table;
pub mod moving_min;
pub mod segment;
pub mod settings;
pub mod stats;

pub use crate::{
    clock::{ClockEstimator, FlowClock},
    dispatcher::{Dispatcher, Record},
    extend::TimestampExtender,
    flow::{FlowRecord, Ingested},
    flow_table::FlowTable,
    match_table::MatchTable,
    moving_min::{MinSample, MovingMin},
    segment::{FlowKey, TcpSegment},
    settings::{Settings, SettingsError},
    stats::{Counters, Reject, SummaryReport},
};
