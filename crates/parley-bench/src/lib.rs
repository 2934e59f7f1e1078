//! Shared fixtures for the Parley benchmarks.

use parley_core::{Engine, EngineConfig, Store};
use parley_protocol::Message;

/// A representative chat message.
#[must_use]
pub fn sample_message(conversation_id: &str, n: u64) -> Message {
    Message {
        id: format!("{n}-{n:016x}"),
        conversation_id: conversation_id.to_string(),
        from: "alice".to_string(),
        text: format!("message number {n} with a little bit of text"),
        time: n,
    }
}

/// An in-memory engine whose hub queues are deep enough for a benchmark run.
#[must_use]
pub fn bench_engine(outbound_capacity: usize) -> Engine {
    let mut config = EngineConfig::default();
    config.hub.outbound_capacity = outbound_capacity;
    Engine::new(Store::in_memory(), config)
}
