use std::io::{self, Write};
use std::path::Path;

use crate::config::Config;
use crate::errors::ConfigError;
use crate::ports::{self, HostProbe};

/// Loads the configuration step by step, printing a line per step. Returns
/// `None` once a step fails; the error has already been printed.
async fn checked_load<W: Write>(
    explicit: Option<&Path>,
    out: &mut W,
    located: &str,
    parsed: &str,
) -> io::Result<Option<Config>> {
    let path = match Config::locate(explicit) {
        Ok(path) => path,
        Err(err) => {
            writeln!(out, "Error: Config file not found.")?;
            writeln!(out, "  {}", err)?;
            return Ok(None);
        }
    };
    writeln!(out, "{} OK ({})", located, path.display())?;

    let config = match Config::from_path(&path).await {
        Ok(config) => config,
        Err(err @ ConfigError::Structure { .. }) => {
            writeln!(out, "Error: Configuration file structure is invalid.")?;
            writeln!(out, "  {}", err)?;
            return Ok(None);
        }
        Err(err) => {
            writeln!(out, "Error: Could not read config file.")?;
            writeln!(out, "  {}", err)?;
            return Ok(None);
        }
    };

    let problems = config.section_problems();
    if !problems.is_empty() {
        writeln!(out, "Error: Configuration file structure is invalid.")?;
        for problem in problems {
            writeln!(out, "  {}", problem)?;
        }
        return Ok(None);
    }
    writeln!(out, "{} OK", parsed)?;

    Ok(Some(config))
}

fn has_services(config: &Config) -> bool {
    !config.services().is_empty()
}

/// `upctl validate`. Returns whether the configuration is valid.
pub async fn validate<W: Write>(explicit: Option<&Path>, out: &mut W) -> io::Result<bool> {
    writeln!(out, "Validating configuration...")?;

    let config = match checked_load(
        explicit,
        out,
        "Configuration file:",
        "YAML syntax and overall structure:",
    )
    .await?
    {
        Some(config) => config,
        None => return Ok(false),
    };

    if !has_services(&config) {
        writeln!(out, "Error: The 'services' key is missing or empty.")?;
        return Ok(false);
    }
    writeln!(
        out,
        "'services' key: Present ({} service(s))",
        config.services().len()
    )?;
    for service in config.services().values() {
        writeln!(
            out,
            "  - {} ({})",
            service.name,
            service.image.as_deref().unwrap_or("no image")
        )?;
    }

    writeln!(out, "{} is valid.", config.path.display())?;
    Ok(true)
}

/// `upctl docker doctor`. Port findings are informational; the result is
/// `false` only when the configuration itself could not be checked.
pub async fn doctor<W, P>(explicit: Option<&Path>, probe: &P, out: &mut W) -> io::Result<bool>
where
    W: Write,
    P: HostProbe + ?Sized,
{
    writeln!(out, "--- Upctl Doctor ---")?;

    let config = match checked_load(
        explicit,
        out,
        "1. Checking config file...",
        "2. Validating config structure (services, volumes, networks)...",
    )
    .await?
    {
        Some(config) => config,
        None => return Ok(false),
    };

    write!(out, "3. Checking for 'services' definition...")?;
    if !has_services(&config) {
        writeln!(out)?;
        writeln!(out, "Error: 'services' key not found or empty.")?;
        return Ok(false);
    }
    writeln!(out, " OK")?;

    writeln!(out)?;
    writeln!(out, "--- Port Conflict Analysis ---")?;
    let report = ports::diagnose(config.services().values(), probe);
    write!(out, "{}", ports::render_report(&report))?;
    if report.has_conflicts() {
        writeln!(
            out,
            "Some ports need attention. Host checks reflect the moment they ran."
        )?;
    }

    writeln!(out)?;
    writeln!(out, "--- Doctor checks complete ---")?;
    Ok(true)
}
