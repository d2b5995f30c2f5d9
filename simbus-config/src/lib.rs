//! Declarative coupling description for `simbus`.
//!
//! A coupled run is described by a [`CouplingDescription`]: the set of
//! participating applications and the directed connections between their
//! ports. The description is written in YAML and is usually produced once
//! and handed to every process of the run, either by the framework
//! launcher (through the environment), embedded in the argument vector of
//! a manual MPMD launch, or as a plain file.
//!
//! ```yaml
//! applications:
//!   - name: sender
//!     np: 2
//!     vars:
//!       model: cortex
//!   - name: receiver
//!     np: 4
//! connections:
//!   - from: sender.spikes_out
//!     to: receiver.spikes_in
//!     width: 64
//!     comm: event
//!     method: collective
//! ```
//!
//! Besides the data model, this crate implements the layered lookup used
//! during bootstrap: an explicit command-line override wins over the
//! environment variable, which wins over a configuration file. See
//! [`ConfigSources`].

#![deny(clippy::all)]

use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Name of the environment variable through which the framework launcher
/// hands the coupling description to each process.
pub const CONFIG_ENV_VAR: &str = "SIMBUS_CONFIG";

/// Argument-vector marker scanned for in manual MPMD launches.
pub const CONFIG_ARGV_OPTION: &str = "--simbus-config";

/// Argument-vector marker naming the application an MPMD process belongs to.
pub const APP_ARGV_OPTION: &str = "--simbus-app";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Error parsing coupling description: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid port reference `{0}`, expected `application.port`")]
    PortRef(String),

    #[error("Invalid coupling description: {0}")]
    Validation(String),

    #[error("Configuration variable `{var}` not found (sources checked: {sources})")]
    MissingVariable { var: String, sources: String },

    #[error("Configuration variable `{var}` has unparsable value `{value}`")]
    BadValue { var: String, value: String },

    #[error("Application `{0}` does not appear in the coupling description")]
    UnknownApplication(String),
}

/// How samples travel over a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommunicationType {
    /// Continuously sampled data, exchanged every schedule interval.
    Continuous,
    /// Discrete events, exchanged when they occur.
    Event,
    /// Opaque messages.
    Message,
}

impl Display for CommunicationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommunicationType::Continuous => write!(f, "continuous"),
            CommunicationType::Event => write!(f, "event"),
            CommunicationType::Message => write!(f, "message"),
        }
    }
}

/// Discipline used to interpret and aggregate a connection's width across
/// the ranks of the participating applications.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingMethod {
    /// Each rank pair exchanges its slice directly.
    PointToPoint,
    /// All ranks participate in a collective exchange.
    Collective,
}

impl Display for ProcessingMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessingMethod::PointToPoint => write!(f, "pointtopoint"),
            ProcessingMethod::Collective => write!(f, "collective"),
        }
    }
}

/// An `application.port` pair naming one end of a connection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PortRef {
    pub app: String,
    pub port: String,
}

impl PortRef {
    pub fn new(app: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            port: port.into(),
        }
    }
}

impl FromStr for PortRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((app, port)) if !app.is_empty() && !port.is_empty() => Ok(Self {
                app: app.to_string(),
                port: port.to_string(),
            }),
            _ => Err(Error::PortRef(s.to_string())),
        }
    }
}

impl TryFrom<String> for PortRef {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<PortRef> for String {
    fn from(r: PortRef) -> Self {
        format!("{}.{}", r.app, r.port)
    }
}

impl Display for PortRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.app, self.port)
    }
}

/// One participating application.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApplicationEntry {
    pub name: String,

    /// Number of processes the application runs with.
    #[serde(default = "default_np")]
    pub np: u32,

    /// Free-form per-application variables, queried through [`Config::get`].
    #[serde(default)]
    pub vars: BTreeMap<String, String>,
}

fn default_np() -> u32 {
    1
}

/// One directed connection between a sender port and a receiver port.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConnectionEntry {
    pub from: PortRef,
    pub to: PortRef,

    /// Number of logical channels. Absent means "infer from the remote
    /// side during negotiation".
    #[serde(default)]
    pub width: Option<u32>,

    pub comm: CommunicationType,
    pub method: ProcessingMethod,
}

/// The complete declarative description of a coupled run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CouplingDescription {
    #[serde(default)]
    pub applications: Vec<ApplicationEntry>,

    #[serde(default)]
    pub connections: Vec<ConnectionEntry>,
}

impl CouplingDescription {
    pub fn from_yaml(yaml: &str) -> Result<Self, Error> {
        let descr: CouplingDescription = serde_yaml::from_str(yaml)?;
        descr.validate()?;
        Ok(descr)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Flatten back to YAML, e.g. to pass through the environment when
    /// relaunching a standalone process under the framework launcher.
    pub fn to_yaml(&self) -> Result<String, Error> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn application(&self, name: &str) -> Option<&ApplicationEntry> {
        self.applications.iter().find(|a| a.name == name)
    }

    fn validate(&self) -> Result<(), Error> {
        let mut seen = std::collections::BTreeSet::new();
        for app in &self.applications {
            if !seen.insert(app.name.as_str()) {
                return Err(Error::Validation(format!(
                    "duplicate application name `{}`",
                    app.name
                )));
            }
            if app.np == 0 {
                return Err(Error::Validation(format!(
                    "application `{}` declares zero processes",
                    app.name
                )));
            }
        }
        for conn in &self.connections {
            for end in [&conn.from, &conn.to] {
                if !seen.contains(end.app.as_str()) {
                    return Err(Error::Validation(format!(
                        "connection endpoint `{end}` references undeclared application"
                    )));
                }
            }
            if conn.width == Some(0) {
                return Err(Error::Validation(format!(
                    "connection `{}` -> `{}` declares zero width",
                    conn.from, conn.to
                )));
            }
        }
        Ok(())
    }
}

/// The layered sources a coupling description may come from, in priority
/// order: explicit command-line override, environment variable, file.
/// The first source that yields a value wins.
#[derive(Clone, Debug, Default)]
pub struct ConfigSources {
    /// Value recovered from the argument vector, if any.
    pub cli_override: Option<String>,

    /// Environment variable to consult. Defaults to [`CONFIG_ENV_VAR`]
    /// when empty.
    pub env_var: String,

    /// Configuration file to fall back to.
    pub file: Option<PathBuf>,
}

impl ConfigSources {
    pub fn new() -> Self {
        Self {
            cli_override: None,
            env_var: CONFIG_ENV_VAR.to_string(),
            file: None,
        }
    }

    fn env_var(&self) -> &str {
        if self.env_var.is_empty() {
            CONFIG_ENV_VAR
        } else {
            &self.env_var
        }
    }

    /// Human-readable list of the sources this resolver consults, used in
    /// the error message when a required variable is missing everywhere.
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if self.cli_override.is_some() {
            parts.push("command-line override".to_string());
        }
        parts.push(format!("environment variable {}", self.env_var()));
        match &self.file {
            Some(path) => parts.push(format!("file {}", path.display())),
            None => parts.push("no configuration file given".to_string()),
        }
        parts.join(", ")
    }

    /// Resolve the raw description text. Returns `None` when no source
    /// yields a value; the caller decides whether that is fatal.
    pub fn resolve_raw(&self) -> Result<Option<String>, Error> {
        if let Some(text) = &self.cli_override {
            log::debug!("coupling description taken from command-line override");
            return Ok(Some(inline_or_file(text)?));
        }
        if let Ok(text) = std::env::var(self.env_var()) {
            log::debug!(
                "coupling description taken from environment variable {}",
                self.env_var()
            );
            return Ok(Some(inline_or_file(&text)?));
        }
        if let Some(path) = &self.file {
            if path.exists() {
                log::debug!("coupling description read from {}", path.display());
                return Ok(Some(std::fs::read_to_string(path)?));
            }
        }
        Ok(None)
    }

    /// Resolve and parse the description for one application.
    pub fn resolve(&self, app_name: &str) -> Result<Option<Config>, Error> {
        match self.resolve_raw()? {
            Some(text) => {
                let description = CouplingDescription::from_yaml(&text)?;
                Ok(Some(Config::for_application(
                    description,
                    app_name,
                    self.describe(),
                )?))
            }
            None => Ok(None),
        }
    }
}

/// CLI and environment values may be either the inline YAML text or a
/// path to a YAML file; a value naming an existing file is read from disk.
fn inline_or_file(value: &str) -> Result<String, Error> {
    let trimmed = value.trim();
    if !trimmed.contains('\n') && Path::new(trimmed).is_file() {
        Ok(std::fs::read_to_string(trimmed)?)
    } else {
        Ok(value.to_string())
    }
}

/// The resolved configuration of one application: its view of the parsed
/// [`CouplingDescription`] plus the record of which sources were checked.
#[derive(Clone, Debug)]
pub struct Config {
    description: CouplingDescription,
    app_name: String,
    sources: String,
}

impl Config {
    pub fn for_application(
        description: CouplingDescription,
        app_name: &str,
        sources: String,
    ) -> Result<Self, Error> {
        if description.application(app_name).is_none() {
            return Err(Error::UnknownApplication(app_name.to_string()));
        }
        Ok(Self {
            description,
            app_name: app_name.to_string(),
            sources,
        })
    }

    pub fn description(&self) -> &CouplingDescription {
        &self.description
    }

    pub fn application_name(&self) -> &str {
        &self.app_name
    }

    fn entry(&self) -> &ApplicationEntry {
        self.description
            .application(&self.app_name)
            .expect("application checked in for_application")
    }

    /// Look up a per-application variable. Absence is not an error:
    /// querying before a variable is defined is a normal pattern.
    pub fn get(&self, var: &str) -> Option<&str> {
        self.entry().vars.get(var).map(String::as_str)
    }

    /// Look up and parse a variable. A present-but-unparsable value is an
    /// error; an absent variable is `None`.
    pub fn get_parsed<T: FromStr>(&self, var: &str) -> Result<Option<T>, Error> {
        match self.get(var) {
            None => Ok(None),
            Some(value) => value.parse().map(Some).map_err(|_| Error::BadValue {
                var: var.to_string(),
                value: value.to_string(),
            }),
        }
    }

    /// Look up a variable that downstream components assume present. The
    /// error names the variable and every source that was checked.
    pub fn require(&self, var: &str) -> Result<&str, Error> {
        self.get(var).ok_or_else(|| Error::MissingVariable {
            var: var.to_string(),
            sources: self.sources.clone(),
        })
    }
}
