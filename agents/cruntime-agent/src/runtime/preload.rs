//! Image inventory matching for preload checks.

use serde::{Deserialize, Deserializer, Serialize};
use tracing::{error, info};

use super::error::Result;
use crate::command::{Cmd, CommandRunner};

const DEFAULT_REGISTRY: &str = "docker.io";
const OFFICIAL_NAMESPACE: &str = "library";
const DEFAULT_TAG: &str = "latest";

/// `crictl images --output json`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(default)]
    pub images: Vec<InventoryEntry>,
}

/// One cached image and the names it is known by
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryEntry {
    pub id: String,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub repo_tags: Vec<String>,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub repo_digests: Vec<String>,

    #[serde(default)]
    pub size: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl Inventory {
    pub fn parse(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Whether any entry carries `name` after normalization.
    pub fn contains(&self, name: &str) -> bool {
        let wanted = normalize_image_name(name);
        self.images.iter().any(|entry| {
            entry
                .repo_tags
                .iter()
                .any(|tag| normalize_image_name(tag) == wanted)
        })
    }
}

/// Expand a short image reference the way the runtime resolves it.
///
/// `pause:3.9` becomes `docker.io/library/pause:3.9`, `coredns/coredns`
/// becomes `docker.io/coredns/coredns:latest`; references that already name
/// a registry host keep it.
pub fn normalize_image_name(name: &str) -> String {
    let name = name.trim();

    let (repository, suffix) = match name.find('@') {
        Some(at) => (&name[..at], &name[at..]),
        None => match name.rfind(':') {
            Some(colon) if !name[colon + 1..].contains('/') => (&name[..colon], &name[colon..]),
            _ => (name, ""),
        },
    };

    let has_registry = match repository.split_once('/') {
        Some((first, _)) => first.contains('.') || first.contains(':') || first == "localhost",
        None => false,
    };

    let mut full = if has_registry {
        repository.to_string()
    } else if repository.contains('/') {
        format!("{}/{}", DEFAULT_REGISTRY, repository)
    } else {
        format!("{}/{}/{}", DEFAULT_REGISTRY, OFFICIAL_NAMESPACE, repository)
    };

    if suffix.is_empty() {
        full.push(':');
        full.push_str(DEFAULT_TAG);
    } else {
        full.push_str(suffix);
    }
    full
}

/// Whether every required image appears in the inventory.
///
/// An empty requirement list is trivially satisfied.
pub fn images_preloaded(required: &[String], inventory: &Inventory) -> bool {
    for image in required {
        if !inventory.contains(image) {
            info!(image = %image, "couldn't find preloaded image, assuming images are not preloaded");
            return false;
        }
    }
    true
}

/// Fetch the runtime's image inventory.
pub async fn fetch_inventory(runner: &dyn CommandRunner) -> Result<Inventory> {
    let result = runner
        .run(&Cmd::sudo(["crictl", "images", "--output", "json"]))
        .await?;
    Inventory::parse(&result.stdout)
}

/// Preload check against the live runtime. Any failure to read the
/// inventory counts as "not preloaded".
pub async fn check_preloaded(runner: &dyn CommandRunner, required: &[String]) -> bool {
    let inventory = match fetch_inventory(runner).await {
        Ok(inventory) => inventory,
        Err(e) => {
            error!(error = %e, "failed to read image inventory, will assume images are not preloaded");
            return false;
        }
    };
    images_preloaded(required, &inventory)
}
