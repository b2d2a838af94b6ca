/**
 * Minimal demo for the stash dispatcher.
 *
 * Start something that prints lines on a TCP port, e.g.
 *
 *   nc -lk 5000
 *
 * then run:
 *
 *   cargo run -p stash_demo
 *   cargo run -p stash_demo -- --panic        # ship a panic event
 *   STASH_PORT=5044 cargo run -p stash_demo   # any STASH_* variable works
 *
 * Set RUST_LOG=stash_core=debug to watch connects, retries and drops.
 */
use std::time::Duration;

use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().collect();
    let test_panic = args.iter().any(|a| a == "--panic");

    let core = match stash::CoreOptions::from_env() {
        Ok(core) => core,
        Err(err) => {
            eprintln!("[demo] Bad STASH_* configuration: {err}");
            std::process::exit(2);
        }
    };

    let _guard = match stash::init(stash::Options {
        core,
        application: Some("stash-demo".into()),
        ..Default::default()
    }) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("[demo] Failed to initialize: {err}");
            std::process::exit(2);
        }
    };

    /*
     * Producers format their own documents; the dispatcher ships them as-is.
     */
    for i in 0..5 {
        let outcome = stash::dispatch(format!(
            r#"{{"@source_path":"demo","@message":"hello #{i}","@fields":{{"version":"{}"}}}}"#,
            stash::STASH_VERSION
        ));
        println!("[demo] Event {i}: {outcome:?}");
    }

    if !stash::flush(Duration::from_secs(2)) {
        println!("[demo] Collector not reachable yet, events stay queued");
    }
    println!("[demo] {:?}", stash::stats());

    /*
     * The panic hook (catch_panics = true by default) ships this before the
     * process unwinds; the guard then drains the queue.
     */
    if test_panic {
        println!("[demo] Triggering a panic...");
        panic!("Test panic from stash demo");
    }

    println!("[demo] Done. The queue is drained when _guard drops.");
}
