pub mod pool;
pub mod schema;

pub use pool::{FulltextAvailability, Lease, Storage};
