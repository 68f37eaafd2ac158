use chrono::{Local, TimeZone};
use tsdelay_core::{Record, SummaryReport};

/// SI-scaled time difference: `12.3ms`, `4.56us`, ` 123s`.
pub fn fmt_time_diff(dt: f64) -> String {
    let (dt, prefix) = if dt < 1e-3 {
        (dt * 1e6, "u")
    } else if dt < 1.0 {
        (dt * 1e3, "m")
    } else {
        (dt, "")
    };
    if dt < 10.0 {
        format!("{dt:.2}{prefix}s")
    } else if dt < 100.0 {
        format!("{dt:.1}{prefix}s")
    } else {
        format!(" {dt:.0}{prefix}s")
    }
}

/// Local `HH:MM:SS` of a wall-clock second.
fn local_stamp(epoch_sec: i64) -> String {
    match Local.timestamp_opt(epoch_sec, 0).single() {
        Some(stamp) => stamp.format("%T").to_string(),
        None => "??:??:??".to_string(),
    }
}

/// `ctime`-style stamp for the first-packet notice.
pub fn local_ctime(epoch_sec: i64) -> String {
    match Local.timestamp_opt(epoch_sec, 0).single() {
        Some(stamp) => stamp.format("%a %b %e %H:%M:%S %Y").to_string(),
        None => epoch_sec.to_string(),
    }
}

/// Machine-readable record line: fixed six-decimal seconds, `-1` for
/// an absent RTT pair, negative dv values when not computed.
pub fn machine_line(record: &Record) -> String {
    let usec = ((record.cap_tm - record.cap_tm.floor()) * 1e6).round() as u32;
    let mut line = format!("{}.{:06}", record.epoch_sec, usec.min(999_999));
    match (record.rtt, record.min_rtt) {
        (Some(rtt), Some(min_rtt)) => line.push_str(&format!(" {rtt:.6} {min_rtt:.6}")),
        _ => line.push_str(" -1 -1"),
    }
    line.push_str(&format!(" {}", record.bytes));
    for dv in record.dv {
        line.push_str(&format!(" {:.6}", dv.unwrap_or(-1.0)));
    }
    line.push_str(&format!(" {}", record.flow));
    line
}

/// Human-readable record line: local time stamp, then each metric
/// SI-scaled or `-` when absent.
pub fn human_line(record: &Record) -> String {
    let mut line = local_stamp(record.epoch_sec);
    for value in [record.rtt, record.min_rtt] {
        match value {
            Some(value) => line.push_str(&format!(" {}", fmt_time_diff(value))),
            None => line.push_str(" -"),
        }
    }
    for dv in record.dv {
        match dv {
            Some(dv) => line.push_str(&format!(" {}", fmt_time_diff(dv))),
            None => line.push_str(" -"),
        }
    }
    line.push_str(&format!(" {}", record.flow));
    line
}

/// The stderr summary line; zero counters stay silent.
pub fn summary_line(report: &SummaryReport) -> String {
    let counters = &report.counters;
    let mut line = format!("{} flows, {} packets, ", report.flows, counters.packets);
    for (value, label) in [
        (counters.no_ts, " no TS opt, "),
        (counters.uni_dir, " uni-directional, "),
        (counters.not_tcp, " not TCP, "),
        (counters.not_v4or6, " not v4 or v6, "),
    ] {
        if value > 0 {
            line.push_str(&format!("{value}{label}"));
        }
    }
    line
}
