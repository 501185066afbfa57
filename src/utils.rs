use std::fmt::Display;
use std::path::PathBuf;

/// Expands a leading `~/` to the home directory and makes the path absolute.
pub fn clean_path(path: &str) -> PathBuf {
    let expanded = match path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        Some(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => PathBuf::from(path),
        },
        None => PathBuf::from(path),
    };

    if expanded.is_absolute() {
        return expanded;
    }

    match std::env::current_dir() {
        Ok(cwd) => cwd.join(expanded),
        Err(_) => expanded,
    }
}

/// A chain of fallible attempts that settles on the first one that works.
///
/// Failed attempts are remembered so the caller can warn about them once the
/// chain falls through to a default.
pub struct Fallback<T> {
    value: Option<T>,
    failures: Vec<String>,
}

impl<T> Fallback<T> {
    pub fn attempt<E: Display>(f: impl FnOnce() -> Result<T, E>) -> Self {
        Fallback {
            value: None,
            failures: Vec::new(),
        }
        .or_try(f)
    }

    pub fn or_try<E: Display>(mut self, f: impl FnOnce() -> Result<T, E>) -> Self {
        if self.value.is_none() {
            match f() {
                Ok(v) => self.value = Some(v),
                Err(err) => self.failures.push(err.to_string()),
            }
        }
        self
    }

    pub fn failures(&self) -> &[String] {
        &self.failures
    }

    /// Returns the settled value, or warns about every failure and returns
    /// `default`.
    pub fn or_warn(self, what: &str, default: T) -> T {
        match self.value {
            Some(v) => v,
            None => {
                for failure in &self.failures {
                    warn!("Could not read {}: {}", what, failure);
                }
                default
            }
        }
    }
}
