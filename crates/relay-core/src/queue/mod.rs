//! Request queueing
//!
//! Orders pending work per channel (HIGH, NORMAL, LOW, FIFO within a tier)
//! and optionally groups batchable requests into one processor call.

mod request_queue;
mod types;


pub use request_queue::{BatchProcessor, QueueHandle, RequestProcessor, RequestQueue};
pub use types::{EnqueueOptions, Priority, QueueConfig, QueueStats};
