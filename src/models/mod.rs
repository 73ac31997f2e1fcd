pub mod table;
pub mod schema;
pub mod request;

pub use table::*;
pub use schema::*;
pub use request::*;
