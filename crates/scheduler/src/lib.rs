//! Worker pool for CPU-heavy document tasks
//!
//! Offloads stateless, byte-buffer work (compression, content analysis) to
//! a fixed pool of worker threads. Submissions block the caller until the
//! result arrives; a task that exceeds its timeout is re-run on the calling
//! thread so the operation still completes, and the worker's late result is
//! discarded.
//!
//! # Example
//!
//! ```
//! use pdf_studio_scheduler::{TaskPool, TaskPoolConfig};
//! use std::sync::Arc;
//!
//! let pool = TaskPool::new(TaskPoolConfig::default());
//!
//! let task = Arc::new(|| 2 + 2);
//! assert_eq!(pool.submit(task), 4);
//!
//! pool.shutdown();
//! ```

mod cancel;
mod pool;

pub use cancel::CancellationToken;
pub use pool::{TaskPool, TaskPoolConfig};
