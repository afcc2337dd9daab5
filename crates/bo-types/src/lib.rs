pub mod errors;
pub mod format;
pub mod query;

pub use errors::*;
pub use format::*;
pub use query::*;
