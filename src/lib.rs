pub mod config;
pub mod error;
pub mod query;
pub mod models;
pub mod github;
pub mod normalize;
pub mod schema;
pub mod connector;

pub use config::{Config, ConnectionData, Credential, FetchOptions, SessionContext};
pub use error::{Error, Result};
pub use github::GitHubClient;
pub use normalize::DataType;
pub use schema::SchemaProvider;
pub use connector::{Connector, RowBuffer, TableSink};
