use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::convert::Infallible;
use std::io::Write;
use std::path::Path;
use tempfile::TempPath;

use crate::config::Config;
use crate::errors::ManifestError;
use crate::utils::Fallback;

/// The compose document handed to the engine. No `version` key: current
/// engines warn about it.
#[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ComposeManifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub services: Option<Mapping>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volumes: Option<Mapping>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub networks: Option<Mapping>,
}

impl ComposeManifest {
    /// Extracts the compose sections from the configuration document.
    ///
    /// A strict decode is tried first. If any section is malformed each one
    /// is extracted on its own and a broken section is dropped with a
    /// warning, so a bad `networks` block does not take `services` down.
    pub fn from_config(config: &Config) -> Self {
        let document = Value::Mapping(config.document().clone());

        let chain = Fallback::attempt(|| serde_yaml::from_value::<ComposeManifest>(document))
            .or_try(|| Ok::<_, Infallible>(Self::by_section(config)));
        for failure in chain.failures() {
            debug!("Strict decode of compose sections failed: {}", failure);
        }

        chain.or_warn("compose sections", ComposeManifest::default())
    }

    fn by_section(config: &Config) -> Self {
        ComposeManifest {
            services: section(config, "services"),
            volumes: section(config, "volumes"),
            networks: section(config, "networks"),
        }
    }

    pub fn render(&self) -> Result<String, ManifestError> {
        Ok(serde_yaml::to_string(self)?)
    }
}

fn section(config: &Config, key: &str) -> Option<Mapping> {
    let value = config.section(key)?.clone();
    Fallback::attempt(|| serde_yaml::from_value::<Option<Mapping>>(value)).or_warn(key, None)
}

/// A synthesized compose file on disk. The file is removed when this value
/// is dropped, whichever way the owning operation ends.
#[derive(Debug)]
pub struct TransientManifest {
    path: TempPath,
}

impl TransientManifest {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Writes the compose sections of `config` to a new, uniquely named file.
/// The file is flushed and closed when this returns.
pub fn synthesize(config: &Config) -> Result<TransientManifest, ManifestError> {
    let contents = ComposeManifest::from_config(config).render()?;

    let mut file = tempfile::Builder::new()
        .prefix("docker-compose-")
        .suffix(".yml")
        .tempfile()?;
    file.write_all(contents.as_bytes())?;
    file.as_file().sync_all()?;

    let path = file.into_temp_path();
    debug!("Wrote compose manifest: {}", path.display());

    Ok(TransientManifest { path })
}
