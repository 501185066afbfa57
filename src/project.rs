use std::sync::Arc;

use crate::access::Teleport;
use crate::config::Config;
use crate::engine::{CommandRunner, Engine};
use crate::errors::{Error, ExternalError, Result};
use crate::manifest::{self, TransientManifest};
use crate::packages::Helm;
use crate::progress::{Progress, ProgressGuard};
use crate::status::{self, StatusReport};
use crate::utils::clean_path;

const MYSQL_SERVICE: &str = "mysql";
const DUMP_PATH_IN_CONTAINER: &str = "/tmp/import.sql";

/// Everything a command needs: the loaded configuration, the engine binary,
/// a way to run programs and a progress indicator.
pub struct Project<R> {
    pub config: Config,
    pub engine: String,
    runner: R,
    progress: Arc<dyn Progress>,
}

/// Which declared services a command applies to.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    All,
    Service(String),
}

impl Target {
    fn services(&self) -> Vec<String> {
        match self {
            Target::All => Vec::new(),
            Target::Service(name) => vec![name.clone()],
        }
    }
}

impl<R: CommandRunner> Project<R> {
    pub fn new(
        config: Config,
        engine: impl Into<String>,
        runner: R,
        progress: Arc<dyn Progress>,
    ) -> Self {
        Project {
            config,
            engine: engine.into(),
            runner,
            progress,
        }
    }

    fn begin(&self, message: &str) -> ProgressGuard<'_> {
        ProgressGuard::start(self.progress.as_ref(), message)
    }

    fn engine(&self) -> Engine<'_, R> {
        Engine::new(&self.runner, &self.engine)
    }

    // Every compose command gets a fresh manifest. It is deleted when the
    // returned guard goes out of scope in the caller.
    fn manifest(&self) -> Result<TransientManifest> {
        Ok(manifest::synthesize(&self.config)?)
    }

    fn ensure_declared(&self, target: &Target) -> Result<()> {
        match target {
            Target::Service(name) if !self.config.has_service(name) => Err(Error::Usage(format!(
                "Service '{}' not found in configuration",
                name
            ))),
            _ => Ok(()),
        }
    }

    pub async fn up(&self, target: &Target) -> Result<()> {
        let _progress = self.begin("Starting services");
        let manifest = self.manifest()?;

        info!("Starting Docker Compose services...");
        self.engine()
            .compose(manifest.path())
            .up(&target.services())
            .await?;
        info!("Docker Compose services started successfully");
        Ok(())
    }

    /// Like `up`, but refuses services that are not declared.
    pub async fn install_service(&self, target: &Target) -> Result<()> {
        self.ensure_declared(target)?;
        match target {
            Target::Service(name) => info!("Installing and starting service: {}", name),
            Target::All => info!("Installing and starting all services..."),
        }
        self.up(target).await
    }

    pub async fn down(&self) -> Result<()> {
        let _progress = self.begin("Stopping services");
        let manifest = self.manifest()?;

        info!("Stopping Docker Compose services...");
        self.engine().compose(manifest.path()).down().await?;
        info!("Docker Compose services stopped successfully");
        Ok(())
    }

    pub async fn logs(&self, target: &Target) -> Result<()> {
        let manifest = self.manifest()?;
        self.engine()
            .compose(manifest.path())
            .logs(&target.services())
            .await?;
        Ok(())
    }

    /// Declared services joined with what the engine reports as running.
    pub async fn ps(&self, requested: &[String]) -> Result<StatusReport> {
        // The engine rejects services it does not know, which would hide the
        // state of every other requested service.
        let declared: Vec<String> = requested
            .iter()
            .filter(|name| self.config.has_service(name))
            .cloned()
            .collect();
        if !requested.is_empty() && declared.is_empty() {
            return Ok(status::reconcile(self.config.services(), requested, Vec::new()));
        }

        let _progress = self.begin("Listing services");
        let manifest = self.manifest()?;

        let engine = self.engine();
        let compose = engine.compose(manifest.path());
        let records = status::query(&compose, &declared).await;

        Ok(status::reconcile(self.config.services(), requested, records))
    }

    pub async fn volumes_ls(&self) -> Result<()> {
        info!("Listing Docker volumes...");
        self.engine().volume_ls().await?;
        Ok(())
    }

    /// Removal failures are reported but not fatal.
    pub async fn volumes_rm(&self, names: &[String]) -> Result<()> {
        info!("Removing Docker volume(s): {}", names.join(", "));
        match self.engine().volume_rm(names).await {
            Ok(()) => info!("Successfully removed volume(s): {}", names.join(", ")),
            Err(err) => error!("Error removing Docker volumes: {}", err),
        }
        Ok(())
    }

    fn helm(&self) -> Helm<'_, R> {
        Helm::new(&self.runner, &self.config)
    }

    pub async fn install_package(&self, target: &Target) -> Result<()> {
        let helm = self.helm();
        let package = match target {
            Target::Service(name) => Some(helm.find(name)?),
            Target::All => None,
        };

        let _progress = self.begin("Installing packages");
        helm.add_repositories().await?;
        match package {
            Some(pkg) => helm.install(&pkg).await,
            None => {
                info!("Installing all packages...");
                helm.install_all().await
            }
        }
    }

    pub async fn remove_package(&self, name: &str) -> Result<()> {
        let helm = self.helm();
        let pkg = helm.find(name)?;

        let _progress = self.begin("Removing package");
        helm.uninstall(&pkg).await?;
        info!("Package removed successfully");
        Ok(())
    }

    pub async fn list_packages(&self) -> Result<()> {
        let _progress = self.begin("Listing packages");
        info!("Listing packages...");
        self.helm().list().await
    }

    /// Loads the configured database dump into the `mysql` service, fetching
    /// the dump through the access broker first when it is not on disk.
    pub async fn import_db(&self) -> Result<()> {
        let mysql = self.config.mysql()?;
        let teleport = self.config.teleport()?;
        if mysql.db_file.trim().is_empty() {
            return Err(ExternalError::Invalid("mysql.db_file is not set".to_string()).into());
        }

        let _progress = self.begin("Importing database");
        let manifest = self.manifest()?;
        let engine = self.engine();
        let compose = engine.compose(manifest.path());

        info!("Ensuring MySQL service is running...");
        compose.up(&[MYSQL_SERVICE.to_string()]).await?;

        let dump = clean_path(&mysql.db_file);
        if !dump.exists() {
            let access = Teleport::new(&self.runner, &teleport);
            access.login().await?;
            access.download_dump(&mysql, &dump).await?;
        }

        info!("Getting MySQL container ID...");
        let container = compose
            .container_id(MYSQL_SERVICE)
            .await?
            .ok_or_else(|| ExternalError::Invalid("MySQL container not found".to_string()))?;

        info!("Copying database file to container...");
        engine
            .copy_into(&dump, &container, DUMP_PATH_IN_CONTAINER)
            .await?;

        info!("Importing database...");
        let import = format!(
            "mysql -u \"$MYSQL_USER\" \"$MYSQL_DATABASE\" < {}",
            DUMP_PATH_IN_CONTAINER
        );
        let env = [
            ("MYSQL_USER".to_string(), mysql.user.clone()),
            ("MYSQL_PWD".to_string(), mysql.password.clone()),
            ("MYSQL_DATABASE".to_string(), mysql.database.clone()),
        ];
        engine
            .exec(&container, &env, &["sh", "-c", &import])
            .await
            .map_err(|err| ExternalError::failed("Importing database", err))?;

        info!("Cleaning up...");
        if let Err(err) = engine
            .exec(&container, &[], &["rm", "-f", DUMP_PATH_IN_CONTAINER])
            .await
        {
            warn!("Error cleaning up: {}", err);
        }

        info!("Database imported successfully");
        Ok(())
    }
}
