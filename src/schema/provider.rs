use futures::future::try_join_all;
use serde::de::DeserializeOwned;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::{JoinDescriptor, Schema, TableDescriptor};
use crate::normalize::DataType;
use crate::schema::source::{DescriptorSource, DirectoryDescriptors, EmbeddedDescriptors};

/// Selects and composes the descriptors making up a data type's schema.
pub struct SchemaProvider {
    source: Box<dyn DescriptorSource>,
}

impl SchemaProvider {
    pub fn new(source: impl DescriptorSource + 'static) -> Self {
        Self {
            source: Box::new(source),
        }
    }

    pub fn embedded() -> Self {
        Self::new(EmbeddedDescriptors)
    }

    pub fn from_config(config: &Config) -> Self {
        match config.schema_dir {
            Some(ref dir) => Self::new(DirectoryDescriptors::new(dir.clone())),
            None => Self::embedded(),
        }
    }

    /// Every table descriptor plus the join descriptor for `data_type`.
    ///
    /// All descriptors are loaded concurrently; any single failure fails the
    /// whole schema.
    pub async fn schema_for(&self, data_type: DataType) -> Result<Schema> {
        tracing::info!("Loading schema for {}", data_type);

        let tables = try_join_all(data_type.tables().iter().map(|name| self.table(name)));
        let joins = self.descriptor::<JoinDescriptor>(data_type.joins_descriptor());

        let (tables, joins) = futures::try_join!(tables, joins)?;

        Ok(Schema {
            tables,
            joins: vec![joins],
        })
    }

    async fn table(&self, name: &str) -> Result<TableDescriptor> {
        let table: TableDescriptor = self.descriptor(name).await?;
        if table.id != name {
            return Err(Error::Schema {
                descriptor: name.to_string(),
                reason: format!("descriptor declares table id {}", table.id),
            });
        }
        Ok(table)
    }

    async fn descriptor<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let json = self.source.load(name).await?;
        serde_json::from_str(&json).map_err(|e| Error::Schema {
            descriptor: name.to_string(),
            reason: e.to_string(),
        })
    }
}
