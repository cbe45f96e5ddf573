//! Domain Layer
//!
//! Value objects and the port traits the striping pipelines depend on.
//!
//! - **Ports** (`ports.rs`) - `BlockSink` and `PayloadWriter` capabilities,
//!   `ObjectName` validation
//!
//! # Usage
//!
//! ```ignore
//! use tristore::domain::{BlockSink, PayloadWriter};
//!
//! struct CountingSink(usize);
//!
//! impl BlockSink for CountingSink {
//!     fn write_block(&mut self, _block: &[u8]) -> tristore::Result<()> {
//!         self.0 += 1;
//!         Ok(())
//!     }
//! }
//! ```

pub mod ports;

pub use ports::{BlockSink, ObjectName, PayloadWriter, WriteSummary};
