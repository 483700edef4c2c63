pub mod adapter;
pub mod credential;
pub mod history;
pub mod record;
pub mod requests;
pub mod schema;

pub use adapter::*;
pub use credential::*;
pub use history::*;
pub use record::*;
pub use requests::*;
pub use schema::*;
