use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Supplies raw JSON table and join descriptors by name.
#[async_trait]
pub trait DescriptorSource: Send + Sync {
    async fn load(&self, name: &str) -> Result<String>;
}

macro_rules! descriptor {
    ($name:literal) => {
        ($name, include_str!(concat!("../../assets/schema/", $name, ".json")))
    };
}

const EMBEDDED: &[(&str, &str)] = &[
    descriptor!("issues"),
    descriptor!("users"),
    descriptor!("milestones"),
    descriptor!("assignees"),
    descriptor!("labels"),
    descriptor!("assigned_labels"),
    descriptor!("comments"),
    descriptor!("pulls"),
    descriptor!("repos"),
    descriptor!("traffic_clones"),
    descriptor!("traffic_popular_paths"),
    descriptor!("traffic_popular_referrers"),
    descriptor!("traffic_views"),
    descriptor!("_issues_joins"),
    descriptor!("_pulls_joins"),
    descriptor!("_traffic_joins"),
];

/// Descriptors compiled into the binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedDescriptors;

#[async_trait]
impl DescriptorSource for EmbeddedDescriptors {
    async fn load(&self, name: &str) -> Result<String> {
        EMBEDDED
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, json)| json.to_string())
            .ok_or_else(|| Error::Schema {
                descriptor: name.to_string(),
                reason: "no such embedded descriptor".to_string(),
            })
    }
}

/// Descriptors read from `<root>/<name>.json`.
#[derive(Debug, Clone)]
pub struct DirectoryDescriptors {
    root: PathBuf,
}

impl DirectoryDescriptors {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl DescriptorSource for DirectoryDescriptors {
    async fn load(&self, name: &str) -> Result<String> {
        let path = self.root.join(format!("{}.json", name));
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| Error::Schema {
                descriptor: name.to_string(),
                reason: format!("{}: {}", path.display(), e),
            })
    }
}
