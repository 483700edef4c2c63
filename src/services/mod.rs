pub mod adapters; // Built-in data-source adapters
pub mod connection_pool;
pub mod credentials;
pub mod fetch_or_cache; // Check-then-populate over the backing store
pub mod query_builder;
pub mod registry;
pub mod session;

pub use connection_pool::*;
pub use credentials::*;
pub use fetch_or_cache::*;
pub use query_builder::*;
pub use registry::*;
pub use session::*;
