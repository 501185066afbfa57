#[macro_use]
extern crate log;

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;

mod access;
mod checks;

mod cli;

mod config;
#[cfg(test)]
mod config_tests;

mod engine;
mod errors;

mod manifest;

mod packages;

mod ports;
#[cfg(test)]
mod ports_tests;

mod progress;

mod project;

mod status;

#[cfg(test)]
mod test_support;

mod utils;
#[cfg(test)]
mod utils_tests;

use cli::{Cli, Command, DockerCommand, VolumesCommand};
use config::Config;
use engine::ProcessRunner;
use errors::Error;
use progress::{NoProgress, Progress, Spinner};
use project::{Project, Target};

#[tokio::main]
async fn main() {
    let env = env_logger::Env::default()
        .filter_or("LOG_LEVEL", "info")
        .write_style_or("LOG_STYLE", "always");
    env_logger::init_from_env(env);

    let cli = Cli::parse();

    let progress: Arc<dyn Progress> = if cli.no_progress {
        Arc::new(NoProgress)
    } else {
        Arc::new(Spinner::new())
    };

    // Dropping the command future on shutdown runs the same cleanup as a
    // normal return: the manifest guard deletes its file, the progress guard
    // stops the spinner and child processes are killed.
    let code = tokio::select! {
        res = run(cli, Arc::clone(&progress)) => match res {
            Ok(code) => code,
            Err(err) => {
                error!("{:#}", err);
                exit_code(&err)
            }
        },
        _ = shutdown_signal() => {
            warn!("Got a stop signal, shutting down");
            130
        }
    };

    progress.stop();
    std::process::exit(code);
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(err) => {
                warn!("Cannot listen for SIGTERM: {}", err);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Failures of the external access, package and database tools exit with 2,
/// everything else with 1.
fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<Error>() {
        Some(Error::External(_)) => 2,
        _ => 1,
    }
}

async fn run(cli: Cli, progress: Arc<dyn Progress>) -> anyhow::Result<i32> {
    cli.validate()?;

    let mut stdout = std::io::stdout();
    match &cli.command {
        Command::Version => {
            println!("v{}", env!("CARGO_PKG_VERSION"));
            return Ok(0);
        }
        Command::Validate => {
            let valid = checks::validate(cli.config.as_deref(), &mut stdout).await?;
            return Ok(if valid { 0 } else { 1 });
        }
        Command::Docker {
            command: DockerCommand::Doctor,
        } => {
            let ok = checks::doctor(cli.config.as_deref(), &ports::TcpProbe, &mut stdout).await?;
            return Ok(if ok { 0 } else { 1 });
        }
        _ => {}
    }

    let config = Config::load(cli.config.as_deref())
        .await
        .context("Error reading config file")?;
    info!("Using config file: {}", config.path.display());

    let runner = ProcessRunner::new(Arc::clone(&progress));
    let project = Project::new(config, cli.engine.as_str(), runner, progress);

    match &cli.command {
        Command::Install(selection) => {
            let target = selection.target_or_all();
            project.install_package(&target).await?;
        }
        Command::Remove { package } => project.remove_package(package).await?,
        Command::List => project.list_packages().await?,
        Command::ImportDb => project.import_db().await?,
        Command::Docker { command } => match command {
            DockerCommand::Up(selection) => project.up(&selection.target_or_all()).await?,
            DockerCommand::Down { all, .. } => {
                if *all {
                    debug!("'down' always applies to every service");
                }
                project.down().await?
            }
            DockerCommand::Ps { services } => {
                info!("Listing Docker Compose services (running and available)...");
                let report = project.ps(services).await?;
                for name in &report.unknown {
                    info!(
                        "Service '{}' is not defined in the configuration, skipping",
                        name
                    );
                }
                print!("{}", status::render_table(&report.services));
                let running = report.services.iter().filter(|s| s.is_running()).count();
                debug!("{} of {} service(s) running", running, report.services.len());
            }
            DockerCommand::Logs(selection) => project.logs(&selection.target_or_all()).await?,
            DockerCommand::Install(selection) => {
                let target = selection.target().unwrap_or(Target::All);
                project.install_service(&target).await?
            }
            DockerCommand::Doctor => {}
        },
        Command::Volumes { command } => match command {
            VolumesCommand::Ls => project.volumes_ls().await?,
            VolumesCommand::Rm { names } => project.volumes_rm(names).await?,
        },
        Command::Validate | Command::Version => {}
    }

    Ok(0)
}
