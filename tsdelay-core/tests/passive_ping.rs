use tsdelay_core::{Dispatcher, FlowKey, Settings, TcpSegment};

fn key(src: &str, sport: u16, dst: &str, dport: u16) -> FlowKey {
    FlowKey {
        src: src.parse().unwrap(),
        sport,
        dst: dst.parse().unwrap(),
        dport,
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

#[test]
fn reverse_direction_echo_is_a_ping() {
    let _ = pretty_env_logger::try_init();
    let mut dispatcher = Dispatcher::new(Settings::default()).unwrap();

    let forward = key("10.0.0.1", 1, "10.0.0.2", 2);
    assert_eq!(
        dispatcher.handle_segment(&segment(0.0, forward, 100, 0, true)),
        None
    );

    let record = dispatcher
        .handle_segment(&segment(0.010, forward.reverse(), 500, 100, false))
        .expect("the echo of tsval 100 is a return ping");
    assert_eq!(record.rtt, Some(0.010));
    assert_eq!(record.min_rtt, Some(0.010));
    assert_eq!(record.flow.to_string(), "10.0.0.2:2+10.0.0.1:1");
}

#[test]
fn the_same_echo_never_matches_twice() {
    let mut dispatcher = Dispatcher::new(Settings::default()).unwrap();

    let forward = key("10.0.0.1", 1, "10.0.0.2", 2);
    dispatcher.handle_segment(&segment(0.0, forward, 100, 0, true));
    assert!(dispatcher
        .handle_segment(&segment(0.010, forward.reverse(), 500, 100, false))
        .is_some());

    // an identical echo a moment later finds the entry spent
    assert_eq!(
        dispatcher.handle_segment(&segment(0.020, forward.reverse(), 500, 100, false)),
        None
    );
}

#[test]
fn aged_out_tsvals_stop_matching() {
    let settings = Settings {
        tsval_max_age: 1.0,
        ..Settings::default()
    };
    let mut dispatcher = Dispatcher::new(settings).unwrap();

    let forward = key("10.0.0.1", 1, "10.0.0.2", 2);
    dispatcher.handle_segment(&segment(0.0, forward, 100, 0, true));
    dispatcher.check_timers();

    // five seconds later the tsval is far past its maximum age
    assert_eq!(
        dispatcher.handle_segment(&segment(5.0, forward.reverse(), 500, 100, false)),
        None
    );
}

#[test]
fn min_rtt_tracks_the_best_ping() {
    let mut dispatcher = Dispatcher::new(Settings::default()).unwrap();

    let forward = key("10.0.0.1", 1, "10.0.0.2", 2);
    let reverse = forward.reverse();

    dispatcher.handle_segment(&segment(0.0, forward, 100, 0, true));
    let first = dispatcher
        .handle_segment(&segment(0.25, reverse, 500, 100, false))
        .unwrap();
    assert_eq!(first.rtt, Some(0.25));
    assert_eq!(first.min_rtt, Some(0.25));

    // a slower ping does not improve the minimum
    dispatcher.handle_segment(&segment(0.5, forward, 101, 500, false));
    let second = dispatcher
        .handle_segment(&segment(1.0, reverse, 501, 101, false))
        .unwrap();
    assert_eq!(second.rtt, Some(0.5));
    assert_eq!(second.min_rtt, Some(0.25));

    // a faster one does
    dispatcher.handle_segment(&segment(1.0, forward, 102, 501, false));
    let third = dispatcher
        .handle_segment(&segment(1.125, reverse, 502, 102, false))
        .unwrap();
    assert_eq!(third.rtt, Some(0.125));
    assert_eq!(third.min_rtt, Some(0.125));
}
