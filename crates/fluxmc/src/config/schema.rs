use serde::{Deserialize, Serialize};

use crate::gitops::resource::{GitSettings, PublishSettings, SyncSettings};

pub const CONFIG_VERSION: &str = "1";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: String,
    /// Control-plane repository the bootstrap manifests are pushed to.
    #[serde(default)]
    pub git: GitSettings,
    #[serde(default)]
    pub publish: PublishSettings,
    #[serde(default)]
    pub sync: SyncSettings,
}

fn default_version() -> String {
    CONFIG_VERSION.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            git: GitSettings::default(),
            publish: PublishSettings::default(),
            sync: SyncSettings::default(),
        }
    }
}
