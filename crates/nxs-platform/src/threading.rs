//! Threading
//!
//! Hardware concurrency hint handed to the hierarchy builder.

use std::thread;

/// Number of hardware threads, at least one
pub fn hardware_threads() -> usize {
    thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(1)
        .max(1)
}
