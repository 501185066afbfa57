use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::errors::ConfigError;
use crate::utils::clean_path;

pub const CONFIG_FILE_NAME: &str = ".upctl.yaml";

/// Top-level keys rendered into the compose manifest.
pub const COMPOSE_SECTIONS: [&str; 3] = ["services", "volumes", "networks"];

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Repository {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Package {
    pub name: String,
    pub repo: String,
    pub namespace: String,
    #[serde(rename = "override", default)]
    pub override_file: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MySqlConfig {
    pub database: String,
    pub user: String,
    pub password: String,
    pub db_file: String,
    pub s3_bucket: String,
    pub s3_key: String,
    pub s3_region: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TeleportConfig {
    pub host: String,
    pub aws_app: String,
    pub aws_role: String,
    pub aws_region: String,
}

/// One entry of the `services` section. Only the image and the port list
/// are interpreted; the rest reaches the compose engine untouched through
/// the manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceDeclaration {
    pub name: String,
    pub image: Option<String>,
    pub ports: Vec<String>,
}

impl ServiceDeclaration {
    fn from_value(path: &Path, name: &str, value: &Value) -> Result<Self, ConfigError> {
        let body = value
            .as_mapping()
            .ok_or_else(|| structure(path, format!("services.{}", name), "must be a mapping"))?;

        let image = match body.get("image") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => {
                return Err(structure(
                    path,
                    format!("services.{}.image", name),
                    "must be a string",
                ))
            }
        };

        let ports = match body.get("ports") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Sequence(entries)) => entries
                .iter()
                .filter_map(|entry| port_entry_to_string(name, entry))
                .collect(),
            Some(_) => {
                return Err(structure(
                    path,
                    format!("services.{}.ports", name),
                    "must be a list",
                ))
            }
        };

        Ok(ServiceDeclaration {
            name: name.to_string(),
            image,
            ports,
        })
    }
}

// Short syntax entries are kept verbatim; long syntax entries are folded into
// `[host_ip:]published:target` so that every declaration reads the same way.
fn port_entry_to_string(service: &str, entry: &Value) -> Option<String> {
    match entry {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Mapping(m) => {
            let field = |key: &str| match m.get(key) {
                Some(Value::String(s)) => Some(s.clone()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            };
            let target = field("target")?;
            let published = match field("published") {
                Some(p) => p,
                None => return Some(target),
            };
            Some(match field("host_ip") {
                Some(ip) => format!("{}:{}:{}", ip, published, target),
                None => format!("{}:{}", published, target),
            })
        }
        other => {
            warn!(
                "Skipping port entry {:?} of service '{}': unsupported type",
                other, service
            );
            None
        }
    }
}

fn structure(path: &Path, key: impl Into<String>, reason: &str) -> ConfigError {
    ConfigError::Structure {
        path: path.to_path_buf(),
        key: key.into(),
        reason: reason.to_string(),
    }
}

/// The loaded configuration document.
///
/// Built once at startup and handed by reference to every command. Sections
/// that belong to the external collaborators are decoded lazily so that a
/// broken `mysql` block does not prevent running compose commands.
#[derive(Debug, Clone)]
pub struct Config {
    pub path: PathBuf,
    document: Mapping,
    services: BTreeMap<String, ServiceDeclaration>,
}

impl Config {
    /// Resolves the configuration file: explicit path first, then the home
    /// directory dotfile, then the one in the working directory.
    pub fn locate(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
        if let Some(path) = explicit {
            if path.is_file() {
                return Ok(path.to_path_buf());
            }
            return Err(ConfigError::NotFound(vec![path.to_path_buf()]));
        }

        let candidates = search_paths();
        candidates
            .iter()
            .find(|p| p.is_file())
            .cloned()
            .ok_or(ConfigError::NotFound(candidates))
    }

    pub async fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = Self::locate(explicit)?;
        Self::from_path(&path).await
    }

    pub async fn from_path(path: &Path) -> Result<Self, ConfigError> {
        debug!("Reading config file: {}", path.display());

        let contents = fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        Self::parse(path, &contents)
    }

    pub fn parse(path: &Path, contents: &str) -> Result<Self, ConfigError> {
        let root: Value = serde_yaml::from_str(contents).map_err(|err| ConfigError::Parse {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;

        let document = match root {
            Value::Null => Mapping::new(),
            Value::Mapping(m) => m,
            _ => return Err(structure(path, "<root>", "must be a mapping")),
        };

        let mut services = BTreeMap::new();
        match document.get("services") {
            None | Some(Value::Null) => {}
            Some(Value::Mapping(entries)) => {
                for (key, value) in entries {
                    let name = key
                        .as_str()
                        .ok_or_else(|| structure(path, "services", "must have string keys"))?;
                    let decl = ServiceDeclaration::from_value(path, name, value)?;
                    services.insert(name.to_string(), decl);
                }
            }
            Some(_) => return Err(structure(path, "services", "must be a mapping")),
        }

        Ok(Config {
            path: path.to_path_buf(),
            document,
            services,
        })
    }

    pub fn services(&self) -> &BTreeMap<String, ServiceDeclaration> {
        &self.services
    }

    pub fn has_service(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    pub fn document(&self) -> &Mapping {
        &self.document
    }

    pub fn section(&self, key: &str) -> Option<&Value> {
        self.document.get(key)
    }

    /// Compose sections that are set but are not mappings. The loader only
    /// rejects a malformed `services`; the others are reported here.
    pub fn section_problems(&self) -> Vec<String> {
        COMPOSE_SECTIONS
            .iter()
            .filter_map(|key| match self.section(key) {
                None | Some(Value::Null) | Some(Value::Mapping(_)) => None,
                Some(_) => Some(format!("'{}' must be a mapping", key)),
            })
            .collect()
    }

    fn decode<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T, ConfigError> {
        match self.section(key) {
            None | Some(Value::Null) => Ok(T::default()),
            Some(value) => serde_yaml::from_value(value.clone()).map_err(|err| {
                ConfigError::Structure {
                    path: self.path.clone(),
                    key: key.to_string(),
                    reason: err.to_string(),
                }
            }),
        }
    }

    fn string(&self, key: &str) -> Option<String> {
        self.section(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
    }

    pub fn repositories(&self) -> Result<Vec<Repository>, ConfigError> {
        self.decode("repositories")
    }

    pub fn packages(&self) -> Result<Vec<Package>, ConfigError> {
        self.decode("packages")
    }

    pub fn mysql(&self) -> Result<MySqlConfig, ConfigError> {
        self.decode("mysql")
    }

    pub fn teleport(&self) -> Result<TeleportConfig, ConfigError> {
        self.decode("teleport")
    }

    pub fn overrides_dir(&self) -> Option<PathBuf> {
        self.string("overrides").map(|p| clean_path(&p))
    }

    pub fn kube_context(&self) -> Option<String> {
        self.string("kube_context")
    }

    pub fn kube_config(&self) -> Option<PathBuf> {
        self.string("kube_config").map(|p| clean_path(&p))
    }
}

fn search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(CONFIG_FILE_NAME));
    }
    paths.push(PathBuf::from(".").join(CONFIG_FILE_NAME));
    paths
}
