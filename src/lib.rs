//! tristore - striped, XOR-parity file store
//!
//! Every logical object is split block by block into two data stripes and one
//! parity stripe (`parity = a ^ b`), each kept in its own directory. Any one
//! of the three directories can be lost; reads reconstruct the missing data
//! half from the other two.
//!
//! # Architecture
//!
//! ```text
//! HTTP server / CLI → Store facade → Striping engine → data-a, data-b, parity
//! ```
//!
//! # Modules
//!
//! - [`domain`] - Object names and the injected write seams
//! - [`error`] - Error types
//! - [`metrics`] - Prometheus counters
//! - [`server`] - HTTP front-end
//! - [`store`] - Store facade: validation, write claims, metrics
//! - [`stripe`] - Striping engine: layout, codec, parity, read/write, repair

pub mod domain;
pub mod error;
pub mod metrics;
pub mod server;
pub mod store;
pub mod stripe;

// Re-export commonly used types
pub use domain::ObjectName;
pub use error::{Error, Result};
pub use metrics::StoreMetrics;
pub use store::{ObjectInfo, StoreConfig, StripeStore};
pub use stripe::{
    PublishedObject, RepairReport, StripeLocations, StripeReader, StripeRole, StripeSet,
    StripeWriter, BLOCK_SIZE, HALF_BLOCK,
};
