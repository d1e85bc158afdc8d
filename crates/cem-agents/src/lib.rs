//! The three-agent reply-processing pipeline (§4.6): intent classification,
//! multi-format extraction, then consolidation against the secondary store.
//! Each stage is independently checkpointed and idempotent on replay; the
//! caller (`cem-worker`) is responsible for sequencing the three `run()`
//! calls per message and deciding what happens after consolidation (outbox
//! write, review enqueue, etc).

pub mod consolidation;
pub mod extraction;
pub mod intent;

pub use consolidation::{Agent3Result, Conflict};
pub use extraction::Agent2Result;
pub use intent::{EmailIntent, IntentResult, MessageHeaders};
