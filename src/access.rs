use std::io::ErrorKind;
use std::path::Path;

use crate::config::{MySqlConfig, TeleportConfig};
use crate::engine::{CommandRunner, Invocation};
use crate::errors::{EngineError, ExternalError};

const TSH: &str = "tsh";

/// The bastion access client. Authentication either succeeds or the whole
/// command fails; how credentials are obtained is up to `tsh`.
pub struct Teleport<'a, R> {
    runner: &'a R,
    settings: &'a TeleportConfig,
}

fn failed(action: &str, err: EngineError) -> ExternalError {
    match err {
        EngineError::Spawn { ref source, .. } if source.kind() == ErrorKind::NotFound => {
            ExternalError::ToolNotFound(TSH.to_string())
        }
        err => ExternalError::failed(action, err),
    }
}

impl<'a, R: CommandRunner> Teleport<'a, R> {
    pub fn new(runner: &'a R, settings: &'a TeleportConfig) -> Self {
        Teleport { runner, settings }
    }

    pub async fn login(&self) -> Result<(), ExternalError> {
        if self.settings.host.is_empty() {
            return Err(ExternalError::Invalid(
                "teleport.host is not set in the configuration".to_string(),
            ));
        }

        info!("Authenticating with Teleport...");
        let inv = Invocation::new(TSH)
            .arg("login")
            .arg(format!("--proxy={}", self.settings.host));
        self.runner
            .stream(&inv)
            .await
            .map_err(|err| failed("Authenticating with Teleport", err))?;

        info!("Authenticating with AWS...");
        let inv = Invocation::new(TSH)
            .args(["apps", "login"])
            .arg(self.settings.aws_app.as_str())
            .arg("--aws-role")
            .arg(self.settings.aws_role.as_str());
        self.runner
            .stream(&inv)
            .await
            .map_err(|err| failed("Authenticating with AWS", err))
    }

    /// Copies the database dump from its bucket to `dest`.
    pub async fn download_dump(
        &self,
        mysql: &MySqlConfig,
        dest: &Path,
    ) -> Result<(), ExternalError> {
        let region = if mysql.s3_region.is_empty() {
            self.settings.aws_region.as_str()
        } else {
            mysql.s3_region.as_str()
        };

        info!("Downloading database...");
        let inv = Invocation::new(TSH)
            .args(["aws", "--app"])
            .arg(self.settings.aws_app.as_str())
            .args(["s3", "cp"])
            .arg(format!("s3://{}/{}", mysql.s3_bucket, mysql.s3_key))
            .arg(dest.to_string_lossy())
            .arg("--region")
            .arg(region);
        self.runner
            .stream(&inv)
            .await
            .map_err(|err| failed("Downloading database", err))
    }
}
