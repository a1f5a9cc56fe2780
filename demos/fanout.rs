//! Fan-out demo with a routed backing relay
//!
//! Run with: cargo run --example fanout
//!
//! Sets up a front relay with one route ("chat", kind 42), connects a few
//! channel-backed clients, opens subscriptions, publishes events and prints
//! what each client receives. Use `RUST_LOG=subrelay=trace` to see every
//! delivery.

use std::sync::Arc;
use std::time::Duration;

use subrelay::{
    cancel_pair, Connection, Event, EventEnvelope, Filter, Relay, RelayConfig, Router,
};
use tokio::sync::mpsc;

/// Print everything a client receives until its connection is dropped
fn spawn_client_printer(name: &'static str, mut rx: mpsc::Receiver<EventEnvelope>) {
    tokio::spawn(async move {
        while let Some(envelope) = rx.recv().await {
            match envelope.encode() {
                Ok(frame) => println!("[{name}] {}", String::from_utf8_lossy(&frame)),
                Err(e) => eprintln!("[{name}] encode error: {e}"),
            }
        }
        println!("[{name}] disconnected");
    });
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("subrelay=debug".parse()?)
                .add_directive("fanout=debug".parse()?),
        )
        .init();

    let front = Relay::with_config(
        RelayConfig::named("front").reap_interval(Duration::from_millis(200)),
    );
    let mut router = Router::new(front.clone());
    let chat = router.route(
        RelayConfig::named("chat"),
        |filter| matches!(filter.kinds.as_deref(), Some([42])),
        |event| event.kind == 42,
    );

    let reaper = front.spawn_reaper();

    // Muted authors never reach anyone on the front relay
    front.prevent_broadcast(|_, event| event.pubkey == "spammer");

    let (alice, alice_rx) = front.accept_channel(32);
    let (bob, bob_rx) = front.accept_channel(32);
    spawn_client_printer("alice", alice_rx);
    spawn_client_printer("bob", bob_rx);

    let (cancel, mut notes_ctx) = cancel_pair();
    router.open_subscription(alice.id(), "notes", Filter::new().kinds([1]), cancel);
    router.open_subscription(alice.id(), "chat", Filter::new().kinds([42]), cancel_pair().0);
    router.open_subscription(bob.id(), "mentions", Filter::new().tag('p', ["bob"]), cancel_pair().0);

    println!("front listening on {:?}", front.listening_filters());
    println!("chat listening on {:?}", chat.listening_filters());

    let events = [
        Event::new("e1", "carol", 1, 1_700_000_000).with_content("hello"),
        Event::new("e2", "carol", 42, 1_700_000_001).with_content("chat message"),
        Event::new("e3", "carol", 1, 1_700_000_002).with_tag(["p", "bob"]),
        Event::new("e4", "spammer", 1, 1_700_000_003),
    ];
    for event in events {
        router.broadcast(&Arc::new(event));
    }

    router.close_subscription(alice.id(), "notes");
    println!("notes closed: {}", notes_ctx.cancelled().await);

    front.remove_connection(bob.id());
    drop(bob);
    tokio::time::sleep(Duration::from_millis(100)).await;

    println!("front stats: {:?}", front.stats());
    println!("chat stats: {:?}", chat.stats());

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_millis(500)) => {}
        _ = tokio::signal::ctrl_c() => {
            println!("\nShutting down...");
        }
    }

    front.shutdown();
    reaper.abort();

    Ok(())
}
