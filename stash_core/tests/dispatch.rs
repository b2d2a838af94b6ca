mod common;

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use common::collector::Collector;
use stash_core::{
    DropReason, Dispatcher, Endpoint, Enqueued, Lifecycle, Options, ShutdownOutcome, TcpTransport,
    Transport,
};

fn options(port: u16) -> Options {
    Options {
        endpoint: Endpoint::new("127.0.0.1", port),
        connect_timeout: Duration::from_millis(500),
        socket_timeout: Duration::from_secs(2),
        retry_delay: Duration::from_millis(100),
        shutdown_timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

fn sequence(range: std::ops::Range<usize>) -> Vec<String> {
    range.map(|i| format!("{{\"seq\":{i}}}")).collect()
}

fn seq_of(line: &str) -> usize {
    line.trim_start_matches("{\"seq\":")
        .trim_end_matches('}')
        .parse()
        .unwrap_or_else(|_| panic!("corrupted line: {line:?}"))
}

#[test]
fn test_delivers_everything_in_enqueue_order() {
    let collector = Collector::start();
    let dispatcher = Dispatcher::new(options(collector.port)).unwrap();

    let messages = sequence(0..500);
    for message in &messages {
        assert_eq!(dispatcher.enqueue(message.as_str()), Enqueued::Accepted);
    }

    assert!(dispatcher.flush(Duration::from_secs(10)));
    assert!(collector.wait_for(500, Duration::from_secs(10)));
    assert_eq!(collector.text_lines(), messages);
    assert_eq!(dispatcher.stats().delivered, 500);
}

#[test]
fn test_capacity_bounds_delivery_while_unreachable() {
    let port = Collector::unused_port();
    let dispatcher = Dispatcher::new(Options {
        queue_capacity: 10,
        ..options(port)
    })
    .unwrap();

    let messages = sequence(0..11);
    let started = Instant::now();
    let results: Vec<Enqueued> = messages
        .iter()
        .map(|m| dispatcher.enqueue(m.as_str()))
        .collect();
    assert!(started.elapsed() < Duration::from_millis(200), "enqueue blocked");

    assert_eq!(
        results.iter().filter(|r| r.is_accepted()).count(),
        10
    );
    assert_eq!(results[10], Enqueued::Dropped(DropReason::QueueFull));

    // Let a few retries fail, then bring the collector up.
    thread::sleep(Duration::from_millis(250));
    let collector = Collector::start_on(port);

    assert!(dispatcher.flush(Duration::from_secs(10)));
    assert!(collector.wait_for(10, Duration::from_secs(5)));
    thread::sleep(Duration::from_millis(100));

    assert_eq!(collector.text_lines(), messages[..10].to_vec());
    assert_eq!(dispatcher.stats().dropped_full, 1);
}

#[test]
fn test_survives_collector_outage() {
    let mut collector = Collector::start();
    let dispatcher = Dispatcher::new(options(collector.port)).unwrap();
    let messages = sequence(0..1000);

    for message in &messages[..200] {
        dispatcher.enqueue(message.as_str());
    }
    assert!(collector.wait_for(200, Duration::from_secs(10)));

    collector.stop();
    for message in &messages[200..400] {
        dispatcher.enqueue(message.as_str());
    }
    thread::sleep(Duration::from_millis(300));

    collector.restart();
    for message in &messages[400..] {
        dispatcher.enqueue(message.as_str());
    }

    assert!(dispatcher.flush(Duration::from_secs(20)));
    // Flush returns once the bytes are written, not once they are read.
    assert!(collector.wait_for(1000, Duration::from_secs(10)));

    let stats = dispatcher.stats();
    assert_eq!(stats.dropped(), 0);
    assert_eq!(stats.delivered, 1000);
    assert!(stats.failed_attempts >= 1);

    // No loss, no reordering, no duplicates, no corruption.
    let delivered: Vec<usize> = collector.text_lines().iter().map(|l| seq_of(l)).collect();
    assert_eq!(delivered, (0..1000).collect::<Vec<_>>());
}

#[test]
fn test_shutdown_zero_never_hangs() {
    let port = Collector::unused_port();
    let dispatcher = Dispatcher::new(options(port)).unwrap();

    for message in sequence(0..100) {
        dispatcher.enqueue(message);
    }

    let started = Instant::now();
    assert_eq!(dispatcher.shutdown(Duration::ZERO), ShutdownOutcome::TimedOut);
    assert!(started.elapsed() < Duration::from_millis(500));
    assert_eq!(dispatcher.state(), Lifecycle::Terminated);
}

#[test]
fn test_shutdown_drains_queue_then_second_call_is_noop() {
    let collector = Collector::start();
    let dispatcher = Dispatcher::new(options(collector.port)).unwrap();
    let messages = sequence(0..1000);

    for message in &messages {
        dispatcher.enqueue(message.as_str());
    }

    assert_eq!(
        dispatcher.shutdown(Duration::from_secs(10)),
        ShutdownOutcome::Drained
    );
    assert!(collector.wait_for(1000, Duration::from_secs(5)));
    assert_eq!(collector.text_lines(), messages);

    assert_eq!(
        dispatcher.shutdown(Duration::from_secs(10)),
        ShutdownOutcome::AlreadyTerminated
    );
    assert_eq!(
        dispatcher.enqueue("late"),
        Enqueued::Dropped(DropReason::ShuttingDown)
    );
}

#[test]
fn test_retries_same_bytes_with_one_connect_per_cycle() {
    let mut collector = Collector::start();
    let opts = options(collector.port);
    let transport = Arc::new(TcpTransport::from_options(&opts));
    let dispatcher = Dispatcher::with_transport(opts, {
        let transport = transport.clone();
        move |_| transport as Arc<dyn Transport>
    })
    .unwrap();

    dispatcher.enqueue("warm-up");
    assert!(collector.wait_for(1, Duration::from_secs(5)));
    assert_eq!(transport.connect_count(), 1);

    collector.stop();

    let payload = "{\"@message\":\"caf\u{e9} \\u00e9\",\"tabs\":\"\t\"}";
    dispatcher.enqueue(payload);
    thread::sleep(Duration::from_millis(450));

    // One failed attempt per retry cycle while the collector is down.
    let failed = dispatcher.stats().failed_attempts;
    assert!((3..=7).contains(&failed), "saw {failed} failed attempts");
    assert_eq!(transport.connect_count(), 1);

    collector.restart();
    assert!(dispatcher.flush(Duration::from_secs(10)));
    assert!(collector.wait_for(2, Duration::from_secs(5)));

    assert_eq!(transport.connect_count(), 2);
    assert_eq!(
        collector.lines(),
        vec![b"warm-up".to_vec(), payload.as_bytes().to_vec()]
    );
}

#[test]
fn test_guard_drains_on_drop() {
    let collector = Collector::start();
    let dispatcher = Arc::new(Dispatcher::new(options(collector.port)).unwrap());

    {
        let _guard = dispatcher.guard();
        for message in sequence(0..50) {
            dispatcher.enqueue(message);
        }
    }

    assert_eq!(dispatcher.state(), Lifecycle::Terminated);
    assert!(collector.wait_for(50, Duration::from_secs(5)));
    assert_eq!(collector.text_lines(), sequence(0..50));
}
