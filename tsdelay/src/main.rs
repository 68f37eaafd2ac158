mod capture;
mod decode;
mod format;

use std::{
    io::{BufWriter, Write},
    process::exit,
    time::{Duration, Instant},
};

use anyhow::Error;
use clap::{error::ErrorKind, Arg, ArgAction, Command};
use log::debug;
use tsdelay_core::{Dispatcher, Settings};

use crate::capture::PacketSource;

const AFTER_HELPTEXT: &str = include_str!("helptext.txt");

fn main() {
    if let Err(e) = run() {
        eprintln!("{e:#}");
        exit(1);
    }
}

enum Input {
    Live(String),
    File(String),
}

fn cli() -> Command {
    Command::new("tsdelay")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Passive ping and delay variation for TCP flows")
        .override_usage("tsdelay [flags] -i interface | -r pcapFile")
        .arg(
            Arg::new("interface")
                .short('i')
                .long("interface")
                .value_name("ifname")
                .conflicts_with("read")
                .help("do live capture from interface <ifname>"),
        )
        .arg(
            Arg::new("read")
                .short('r')
                .long("read")
                .value_name("pcap")
                .help("process capture file <pcap>"),
        )
        .arg(
            Arg::new("filter")
                .short('f')
                .long("filter")
                .value_name("expr")
                .help("pcap filter applied to packets, ANDed with 'tcp'"),
        )
        .arg(
            Arg::new("count")
                .short('c')
                .long("count")
                .value_name("num")
                .value_parser(clap::value_parser!(u64))
                .help("stop after capturing <num> packets"),
        )
        .arg(
            Arg::new("seconds")
                .short('s')
                .long("seconds")
                .value_name("num")
                .value_parser(clap::value_parser!(f64))
                .help("stop after capturing for <num> seconds"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .action(ArgAction::SetTrue)
                .help("don't print summary reports to stderr"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("print summary reports to stderr every sumInt seconds (default on)"),
        )
        .arg(
            Arg::new("showLocal")
                .short('l')
                .long("showLocal")
                .action(ArgAction::SetTrue)
                .help("show RTTs through local host applications"),
        )
        .arg(
            Arg::new("machine")
                .short('m')
                .long("machine")
                .action(ArgAction::SetTrue)
                .help(
                    "machine-readable output for graphing or post-processing; \
                     timestamps are seconds since capture start, all times \
                     with 1us resolution",
                ),
        )
        .arg(
            Arg::new("sumInt")
                .long("sumInt")
                .value_name("num")
                .value_parser(clap::value_parser!(f64))
                .help("summary report interval (default 10s)"),
        )
        .arg(
            Arg::new("tsvalMaxAge")
                .long("tsvalMaxAge")
                .value_name("num")
                .value_parser(clap::value_parser!(f64))
                .help("max age of an unmatched tsval (default 10s)"),
        )
        .arg(
            Arg::new("flowMaxIdle")
                .long("flowMaxIdle")
                .value_name("num")
                .value_parser(clap::value_parser!(f64))
                .help("flows idle longer than this are deleted (default 300s)"),
        )
        .after_help(AFTER_HELPTEXT)
}

/// The BPF filter always starts from `tcp`; a user expression can
/// only narrow it further.
fn build_filter(expr: Option<&str>) -> String {
    match expr {
        Some(expr) => format!("tcp and ({expr})"),
        None => "tcp".to_string(),
    }
}

fn run() -> Result<(), Error> {
    pretty_env_logger::init();

    let matches = match cli().try_get_matches() {
        Ok(matches) => matches,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = e.print();
            return Ok(());
        }
        Err(e) => {
            let _ = e.print();
            exit(1);
        }
    };

    let input = match (
        matches.get_one::<String>("interface"),
        matches.get_one::<String>("read"),
    ) {
        (Some(ifname), None) => Input::Live(ifname.clone()),
        (None, Some(path)) => Input::File(path.clone()),
        _ => {
            eprintln!("usage: tsdelay [flags] -i interface | -r pcapFile");
            exit(1);
        }
    };

    let filter = build_filter(matches.get_one::<String>("filter").map(String::as_str));

    let machine = matches.get_flag("machine");
    let show_local = matches.get_flag("showLocal");
    let max_packets = matches.get_one::<u64>("count").copied().unwrap_or(0);
    let time_to_run = matches.get_one::<f64>("seconds").copied().unwrap_or(0.0);
    let summary_interval = if matches.get_flag("quiet") {
        0.0
    } else {
        matches.get_one::<f64>("sumInt").copied().unwrap_or(10.0)
    };

    let (mut source, local_addr) = match &input {
        Input::Live(ifname) => {
            let source = PacketSource::open_live(ifname, &filter)?;
            // without a local address the filter silently disables
            let local_addr = if show_local {
                None
            } else {
                capture::local_addr_of(ifname)
            };
            (source, local_addr)
        }
        Input::File(path) => (PacketSource::open_file(path, &filter)?, None),
    };
    let link = source.link_layer()?;
    debug!("capture open, link layer {link:?}");

    let settings = Settings {
        summary_interval,
        tsval_max_age: matches
            .get_one::<f64>("tsvalMaxAge")
            .copied()
            .unwrap_or(10.0),
        flow_max_idle: matches
            .get_one::<f64>("flowMaxIdle")
            .copied()
            .unwrap_or(300.0),
        local_addr,
        ..Settings::default()
    };
    let mut dispatcher = Dispatcher::new(settings)?;

    // output every 100ms when piping live to an analysis program
    let flush_interval = if machine && matches!(input, Input::Live(_)) {
        Duration::from_millis(100)
    } else {
        Duration::from_secs(1)
    };
    let mut next_flush = Instant::now() + flush_interval;
    let mut out = BufWriter::new(std::io::stdout());

    loop {
        let packet = match source.next_packet() {
            Ok(packet) => packet,
            Err(pcap::Error::TimeoutExpired) => continue,
            Err(pcap::Error::NoMorePackets) => break,
            Err(e) => return Err(Error::new(e).context("capture read failed")),
        };
        let cap_tm = packet.header.ts.tv_sec as f64 + packet.header.ts.tv_usec as f64 * 1e-6;
        let first_pending = dispatcher.origin().is_none();

        let record = match decode::decode(link, packet.data, cap_tm, packet.header.len) {
            Ok(segment) => dispatcher.handle_segment(&segment),
            Err(reject) => {
                dispatcher.reject(reject);
                None
            }
        };

        if first_pending && dispatcher.origin().is_some() && summary_interval > 0.0 {
            eprintln!(
                "First packet at {}\n",
                format::local_ctime(packet.header.ts.tv_sec as i64)
            );
        }

        if let Some(record) = record {
            let line = if machine {
                format::machine_line(&record)
            } else {
                format::human_line(&record)
            };
            writeln!(out, "{line}")?;
        }

        if (time_to_run > 0.0 && dispatcher.elapsed() >= time_to_run)
            || (max_packets > 0 && dispatcher.total_packets() >= max_packets)
        {
            break;
        }

        if let Some(report) = dispatcher.check_timers() {
            eprintln!("{}", format::summary_line(&report));
        }

        if Instant::now() >= next_flush {
            out.flush()?;
            next_flush = Instant::now() + flush_interval;
        }
    }

    eprintln!("{}", format::summary_line(&dispatcher.summary()));
    eprintln!(
        "Captured {} packets in {} seconds",
        dispatcher.total_packets(),
        dispatcher.elapsed()
    );
    out.flush()?;
    Ok(())
}
