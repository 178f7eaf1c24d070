//! In-process transport.
//!
//! # Data Flow
//! ```text
//! dial()                                accept()
//!   → duplex pair (client, server)
//!   → HandoffRecord { server, ack } ──▶ queue.rs (bounded FIFO) ──▶ claim record
//!   ◀─────────────── ack ◀──────────────────────────────────────── signal ack
//!   → client end                                                  → server end
//! ```
//!
//! # Design Decisions
//! - Rendezvous: dial returns only after an accept claimed its record
//! - Backpressure: dials wait while the queue is full
//! - Close drains the queue; dropping a record closes its endpoints

pub mod memory;
pub mod named;
pub mod queue;

pub use memory::{InMemoryTransport, MemoryConn, TransportOptions};
pub use named::NamedPipe;
pub use queue::{EnqueueError, HandoffQueue, QueueClosed};
