pub mod source;
pub mod provider;

pub use source::{DescriptorSource, DirectoryDescriptors, EmbeddedDescriptors};
pub use provider::SchemaProvider;
