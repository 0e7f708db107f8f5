//! Discovery of setup files.
//!
//! The setup generator writes one setup file per instrument configuration, named
//! `<instrument>_<index>.<ext>` (e.g. `keck_deimos_A.pypeit`), somewhere below the setup files
//! directory. Each of them becomes one [WorkUnit].

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::Regex;

use crate::error::Lev2Error;
use crate::models::{RunContext, WorkUnit};

/// Matches setup file names for one instrument and extension.
#[derive(Debug)]
pub struct SetupFilePattern {
    regex: Regex,
}

impl SetupFilePattern {
    /// Returns a pattern matching `<instrument>_<index>.<extension>`, where `<index>` is one or
    /// more ASCII alphanumeric characters.
    pub fn new(instrument: &str, extension: &str) -> Result<Self, Lev2Error> {
        let pattern = format!(
            r"^{}_[A-Za-z0-9]+\.{}$",
            regex::escape(instrument),
            regex::escape(extension.trim_start_matches('.'))
        );
        let regex = Regex::new(&pattern)?;
        Ok(Self { regex })
    }

    /// Returns the job name (file stem) if `path` is a matching setup file.
    pub fn job_name(&self, path: &Path) -> Option<String> {
        let file_name = path.file_name()?.to_str()?;
        if !self.regex.is_match(file_name) {
            return None;
        }
        path.file_stem()?.to_str().map(String::from)
    }
}

/// Discover the work units for a run.
///
/// Recursively scans the setup files directory of `context` and returns one [WorkUnit] per
/// matching setup file, sorted by path so that repeated discovery of an unchanged directory
/// yields the same sequence. An empty directory yields no work units.
///
/// Job names are unique: if two setup files share a name, only the first in path order is kept,
/// since both would write to the same log file and output directory.
///
/// # Arguments
///
/// * `context`: Run context, shared by every returned work unit
/// * `extension`: Setup file extension
#[tracing::instrument(level = "DEBUG", skip(context), fields(instrument = %context.instrument))]
pub fn discover(context: &Arc<RunContext>, extension: &str) -> Result<Vec<WorkUnit>, Lev2Error> {
    let setup_dir = context.setup_dir();
    let pattern = SetupFilePattern::new(&context.instrument, extension)?;

    let mut files = Vec::new();
    collect_files(&setup_dir, &mut files)?;
    files.sort();

    let mut names = HashSet::new();
    let mut units = Vec::new();
    for descriptor in files {
        let Some(name) = pattern.job_name(&descriptor) else {
            continue;
        };
        if !names.insert(name.clone()) {
            tracing::warn!(
                "Ignoring {}, a setup file for {} was already found",
                descriptor.display(),
                name
            );
            continue;
        }
        units.push(WorkUnit {
            name,
            descriptor,
            context: context.clone(),
        });
    }
    tracing::debug!(
        "found {} setup files in {}",
        units.len(),
        setup_dir.display()
    );
    Ok(units)
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), Lev2Error> {
    let discovery_error = |source| Lev2Error::Discovery {
        path: dir.to_path_buf(),
        source,
    };
    for entry in fs::read_dir(dir).map_err(discovery_error)? {
        let entry = entry.map_err(discovery_error)?;
        // Symlinks are not followed into, so a link cycle cannot recurse forever.
        if entry.file_type().map_err(discovery_error)?.is_dir() {
            collect_files(&entry.path(), files)?;
        } else {
            files.push(entry.path());
        }
    }
    Ok(())
}
