use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::errors::Error;
use crate::project::Target;

#[derive(Debug, Parser)]
#[command(
    name = "upctl",
    version,
    about = "upctl is a CLI tool to manage the local development environment"
)]
pub struct Cli {
    /// Config file (default is $HOME/.upctl.yaml, then ./.upctl.yaml)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Container engine binary used for compose commands
    #[arg(long, global = true, env = "UPCTL_ENGINE", default_value = "docker")]
    pub engine: String,

    /// Do not show the progress spinner
    #[arg(long, global = true)]
    pub no_progress: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// A service (or package) name, or `--all`.
#[derive(Debug, Args)]
pub struct Selection {
    pub name: Option<String>,

    #[arg(short, long, conflicts_with = "name")]
    pub all: bool,
}

impl Selection {
    /// `None` when neither a name nor `--all` was given.
    pub fn target(&self) -> Option<Target> {
        match (&self.name, self.all) {
            (_, true) => Some(Target::All),
            (Some(name), false) => Some(Target::Service(name.clone())),
            (None, false) => None,
        }
    }

    /// Commands where an empty selection means everything.
    pub fn target_or_all(&self) -> Target {
        self.target().unwrap_or(Target::All)
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Install a package using Helm. Provide --all to install all packages
    Install(Selection),

    /// Remove an installed package from the cluster
    Remove { package: String },

    /// List installed packages
    List,

    /// Import the configured database dump into the mysql service
    ImportDb,

    /// Manage Docker Compose services declared in the configuration
    Docker {
        #[command(subcommand)]
        command: DockerCommand,
    },

    /// Manage Docker volumes
    Volumes {
        #[command(subcommand)]
        command: VolumesCommand,
    },

    /// Check the configuration file for problems
    Validate,

    /// Print the version number of upctl
    Version,
}

#[derive(Debug, Subcommand)]
pub enum DockerCommand {
    /// Start services in the background
    Up(Selection),

    /// Stop and remove all services of the environment
    Down {
        #[arg(short, long)]
        all: bool,

        // Accepted only to give a clear error: `down` has no service filter.
        #[arg(hide = true)]
        services: Vec<String>,
    },

    /// Show declared services next to what is running
    Ps { services: Vec<String> },

    /// Follow the logs of one or all services
    Logs(Selection),

    /// Start a declared service, or all of them
    Install(Selection),

    /// Check the configuration and look for port conflicts
    Doctor,
}

#[derive(Debug, Subcommand)]
pub enum VolumesCommand {
    /// List Docker volumes
    Ls,

    /// Remove one or more Docker volumes
    Rm {
        #[arg(required = true)]
        names: Vec<String>,
    },
}

impl Cli {
    /// Checks that clap cannot express.
    pub fn validate(&self) -> Result<(), Error> {
        match &self.command {
            Command::Install(selection) if selection.target().is_none() => Err(Error::Usage(
                "Please provide a package name or --all".to_string(),
            )),
            Command::Docker {
                command: DockerCommand::Install(selection),
            } if selection.target().is_none() => Err(Error::Usage(
                "Please provide a service name or --all".to_string(),
            )),
            Command::Docker {
                command: DockerCommand::Down { services, .. },
            } if !services.is_empty() => Err(Error::Usage(format!(
                "'docker down' stops the whole environment and does not take service names (got: {})",
                services.join(", ")
            ))),
            _ => Ok(()),
        }
    }
}
