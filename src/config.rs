//! Configuration file loading.
//!
//! The configuration file is an `.ini` file with an `[INSTRUMENTS]` section mapping Keck
//! instrument names to PypeIt spectrograph names and raw file roots, and an optional `[RTI]`
//! section describing the ingestion endpoint to alert when a reduction completes.
//!
//! ```ini
//! [INSTRUMENTS]
//! keck_inst_names = DEIMOS KCWI
//! pypeit_inst_names = keck_deimos keck_kcwi
//! roots = DE. KB.
//!
//! [RTI]
//! url = https://rti.example.org/api
//! user = koa
//! pw = secret
//! rti_ingesttype = lev2
//! ```
//!
//! The loaded [Lev2Config] is immutable and passed explicitly to whatever needs it.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use ini::{Ini, Properties};
use url::Url;

use crate::error::Lev2Error;

const INSTRUMENTS_SECTION: &str = "INSTRUMENTS";
const RTI_SECTION: &str = "RTI";

/// Default timeout for requests to the ingestion endpoint.
const DEFAULT_RTI_TIMEOUT_SECS: u64 = 30;

/// One row of the instrument table.
#[derive(Clone, Debug, PartialEq)]
pub struct InstrumentOptions {
    /// Keck instrument name, e.g. `DEIMOS`
    pub keck_name: String,
    /// PypeIt spectrograph name, e.g. `keck_deimos`. Setup files are named after it.
    pub pypeit_name: String,
    /// Raw file root, e.g. `DE.`
    pub root: String,
}

/// Mapping of instrument names to their PypeIt name and raw file root.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InstrumentTable {
    instruments: Vec<InstrumentOptions>,
}

impl InstrumentTable {
    /// Build the table from the three space separated lists of the `[INSTRUMENTS]` section.
    fn from_section(section: &Properties) -> Result<Self, Lev2Error> {
        let keck_names = split_list(section, "keck_inst_names")?;
        let pypeit_names = split_list(section, "pypeit_inst_names")?;
        let roots = split_list(section, "roots")?;
        for (key, list) in [("pypeit_inst_names", &pypeit_names), ("roots", &roots)] {
            if list.len() != keck_names.len() {
                return Err(Lev2Error::config(format!(
                    "{} has {} entries, expected {} to match keck_inst_names",
                    key,
                    list.len(),
                    keck_names.len()
                )));
            }
        }
        let instruments = keck_names
            .into_iter()
            .zip(pypeit_names)
            .zip(roots)
            .map(|((keck_name, pypeit_name), root)| InstrumentOptions {
                keck_name,
                pypeit_name,
                root,
            })
            .collect();
        Ok(Self { instruments })
    }

    /// Look up an instrument by its Keck name or its PypeIt name.
    pub fn lookup(&self, name: &str) -> Option<&InstrumentOptions> {
        self.instruments
            .iter()
            .find(|inst| inst.keck_name == name || inst.pypeit_name == name)
    }

    /// Keck names of all configured instruments, in configuration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.instruments.iter().map(|inst| inst.keck_name.as_str())
    }

    /// Human readable list of instrument names, e.g. `'DEIMOS', 'KCWI'`.
    pub fn options(&self) -> String {
        self.names()
            .map(|name| format!("'{}'", name))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }
}

/// Settings for alerting RTI, the ingestion service.
#[derive(Clone)]
pub struct RtiConfig {
    /// Endpoint to send the ingestion request to
    pub url: Url,
    /// Basic auth user name
    pub user: String,
    /// Basic auth password
    pub password: String,
    /// Value of the `ingesttype` query parameter
    pub ingest_type: String,
    /// Value of the `reingest` query parameter
    pub reingest: String,
    /// Value of the `testonly` query parameter
    pub test_only: String,
    /// Value of the `dev` query parameter
    pub dev: String,
    /// Request timeout
    pub timeout: Duration,
}

impl fmt::Debug for RtiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RtiConfig")
            .field("url", &self.url.as_str())
            .field("user", &self.user)
            .field("password", &"********")
            .field("ingest_type", &self.ingest_type)
            .field("reingest", &self.reingest)
            .field("test_only", &self.test_only)
            .field("dev", &self.dev)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RtiConfig {
    fn from_section(section: &Properties) -> Result<Self, Lev2Error> {
        let url = required(section, RTI_SECTION, "url")?;
        let url = Url::parse(url)
            .map_err(|err| Lev2Error::config(format!("invalid RTI url {}: {}", url, err)))?;
        let timeout = match section.get("timeout") {
            Some(secs) => secs.trim().parse::<u64>().map_err(|err| {
                Lev2Error::config(format!("invalid RTI timeout {}: {}", secs, err))
            })?,
            None => DEFAULT_RTI_TIMEOUT_SECS,
        };
        Ok(Self {
            url,
            user: required(section, RTI_SECTION, "user")?.to_string(),
            password: required(section, RTI_SECTION, "pw")?.to_string(),
            ingest_type: section.get("rti_ingesttype").unwrap_or("lev2").to_string(),
            reingest: flag(section, "rti_reingest"),
            test_only: flag(section, "rti_testonly"),
            dev: flag(section, "rti_dev"),
            timeout: Duration::from_secs(timeout),
        })
    }
}

/// Top-level configuration, loaded once at startup.
#[derive(Clone, Debug)]
pub struct Lev2Config {
    /// Instrument table
    pub instruments: InstrumentTable,
    /// Ingestion settings, if RTI should be alerted
    pub rti: Option<RtiConfig>,
}

impl Lev2Config {
    /// Load the configuration from an `.ini` file.
    ///
    /// # Arguments
    ///
    /// * `path`: Path to the configuration file
    pub fn load(path: &Path) -> Result<Self, Lev2Error> {
        let ini = Ini::load_from_file(path).map_err(|source| Lev2Error::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ini(&ini)
    }

    /// Build the configuration from an already parsed `.ini` document.
    pub fn from_ini(ini: &Ini) -> Result<Self, Lev2Error> {
        let instruments = ini
            .section(Some(INSTRUMENTS_SECTION))
            .ok_or_else(|| {
                Lev2Error::config(format!("missing [{}] section", INSTRUMENTS_SECTION))
            })
            .and_then(InstrumentTable::from_section)?;
        let rti = ini
            .section(Some(RTI_SECTION))
            .map(RtiConfig::from_section)
            .transpose()?;
        Ok(Self { instruments, rti })
    }
}

fn required<'a>(section: &'a Properties, name: &str, key: &str) -> Result<&'a str, Lev2Error> {
    section
        .get(key)
        .ok_or_else(|| Lev2Error::config(format!("missing {} in [{}] section", key, name)))
}

fn split_list(section: &Properties, key: &str) -> Result<Vec<String>, Lev2Error> {
    Ok(required(section, INSTRUMENTS_SECTION, key)?
        .split_whitespace()
        .map(String::from)
        .collect())
}

// Flags are forwarded to RTI verbatim.
fn flag(section: &Properties, key: &str) -> String {
    section.get(key).unwrap_or("False").to_string()
}
