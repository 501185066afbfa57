use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::config::{Config, Package};
use crate::engine::{CommandRunner, Invocation};
use crate::errors::{ExternalError, Result};

const HELM: &str = "helm";
const INSTALL_TIMEOUT: &str = "1m";

/// Chart releases, managed through the `helm` binary.
pub struct Helm<'a, R> {
    runner: &'a R,
    config: &'a Config,
}

impl<'a, R: CommandRunner> Helm<'a, R> {
    pub fn new(runner: &'a R, config: &'a Config) -> Self {
        Helm { runner, config }
    }

    fn invocation(&self) -> Invocation {
        let mut inv = Invocation::new(HELM);
        if let Some(context) = self.config.kube_context() {
            inv = inv.arg("--kube-context").arg(context);
        }
        if let Some(kube_config) = self.config.kube_config() {
            inv = inv.arg("--kubeconfig").arg(kube_config.to_string_lossy());
        }
        inv
    }

    pub fn find(&self, name: &str) -> Result<Package> {
        let packages = self.config.packages()?;
        match packages.iter().find(|p| p.name == name) {
            Some(pkg) => Ok(pkg.clone()),
            None => {
                let known: Vec<&str> = packages.iter().map(|p| p.name.as_str()).collect();
                Err(ExternalError::Invalid(format!(
                    "Package not found: {}. Known packages: {}",
                    name,
                    if known.is_empty() {
                        "none".to_string()
                    } else {
                        known.join(", ")
                    }
                ))
                .into())
            }
        }
    }

    pub async fn add_repositories(&self) -> Result<()> {
        let repositories = self.config.repositories()?;
        if repositories.is_empty() {
            return Ok(());
        }

        info!("Adding repositories...");
        for repo in &repositories {
            info!(" {} with URL {}", repo.name, repo.url);
            let inv = self
                .invocation()
                .args(["repo", "add", "--force-update"])
                .arg(repo.name.as_str())
                .arg(repo.url.as_str());
            self.runner
                .stream(&inv)
                .await
                .map_err(|err| ExternalError::failed(format!("Adding repo {}", repo.name), err))?;
        }

        let inv = self.invocation().args(["repo", "update"]);
        self.runner
            .stream(&inv)
            .await
            .map_err(|err| ExternalError::failed("Updating repositories", err))?;
        Ok(())
    }

    fn values_file(&self, pkg: &Package) -> Option<PathBuf> {
        if pkg.override_file.trim().is_empty() {
            return None;
        }
        Some(match self.config.overrides_dir() {
            Some(dir) => dir.join(&pkg.override_file),
            None => PathBuf::from(&pkg.override_file),
        })
    }

    pub async fn install(&self, pkg: &Package) -> Result<()> {
        let mut inv = self
            .invocation()
            .args(["upgrade", "--install"])
            .arg(pkg.name.as_str())
            .arg(pkg.repo.as_str())
            .arg("--namespace")
            .arg(pkg.namespace.as_str())
            .args(["--create-namespace", "--wait", "--timeout", INSTALL_TIMEOUT]);

        match self.values_file(pkg) {
            Some(values) => {
                if !values.is_file() {
                    return Err(ExternalError::Invalid(format!(
                        "Override file for {} not found: {}",
                        pkg.name,
                        values.display()
                    ))
                    .into());
                }
                info!(
                    "Installing package {} from repo {} with namespace {} and override {}",
                    pkg.name,
                    pkg.repo,
                    pkg.namespace,
                    values.display()
                );
                inv = inv.arg("--values").arg(values.to_string_lossy());
            }
            None => info!(
                "Installing package {} from repo {} with namespace {}",
                pkg.name, pkg.repo, pkg.namespace
            ),
        }

        self.runner
            .stream(&inv)
            .await
            .map_err(|err| ExternalError::failed(format!("Installing package {}", pkg.name), err))?;
        Ok(())
    }

    pub async fn install_all(&self) -> Result<()> {
        for pkg in self.config.packages()? {
            self.install(&pkg).await?;
        }
        Ok(())
    }

    pub async fn uninstall(&self, pkg: &Package) -> Result<()> {
        let inv = self
            .invocation()
            .arg("uninstall")
            .arg(pkg.name.as_str())
            .arg("--namespace")
            .arg(pkg.namespace.as_str());
        self.runner
            .stream(&inv)
            .await
            .map_err(|err| ExternalError::failed(format!("Removing package {}", pkg.name), err))?;
        Ok(())
    }

    /// Namespaces that `list` looks at: `default` plus every package's.
    pub fn namespaces(&self) -> Result<Vec<String>> {
        let mut namespaces = vec!["default".to_string()];
        let mut seen: BTreeSet<String> = namespaces.iter().cloned().collect();
        for pkg in self.config.packages()? {
            if !pkg.namespace.is_empty() && seen.insert(pkg.namespace.clone()) {
                namespaces.push(pkg.namespace);
            }
        }
        Ok(namespaces)
    }

    pub async fn list(&self) -> Result<()> {
        for namespace in self.namespaces()? {
            let inv = self
                .invocation()
                .arg("list")
                .arg("--namespace")
                .arg(namespace.as_str());
            self.runner
                .stream(&inv)
                .await
                .map_err(|err| ExternalError::failed("Listing packages", err))?;
        }
        Ok(())
    }
}
