pub mod facade;
pub mod sink;

pub use facade::{Connector, ConnectorState};
pub use sink::{BufferedTable, RowBuffer, TableSink};
