//! Layered application configuration.
//!
//! Sources are merged in registration order, later sources overriding earlier
//! ones key by key. The default layering added by the service defaults is:
//! 1. `appsettings.json` (required)
//! 2. `appsettings.{environment}.json` (optional)
//! 3. Environment variables, with `__` separating sections
//!    (`Services__catalog__http` is `services.catalog.http`)
//!
//! Keys are case-insensitive. Both `.` and `:` are accepted as section
//! separators in lookups.

use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Json};
use figment::value::{Dict, Map, Value};
use figment::{Figment, Metadata, Profile, Provider};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::ServiceDefaultsError;

const ENV_SECTION_SEPARATOR: &str = "__";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    JsonFile { path: PathBuf, optional: bool },
    EnvironmentVariables { prefix: Option<String> },
}

#[derive(Debug, Clone, Default)]
pub struct ConfigurationBuilder {
    sources: Vec<ConfigSource>,
}

impl ConfigurationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a source. A source that is already registered keeps its
    /// original position.
    pub fn add_source(&mut self, source: ConfigSource) -> &mut Self {
        if !self.sources.contains(&source) {
            self.sources.push(source);
        }
        self
    }

    pub fn add_json_file(&mut self, path: impl Into<PathBuf>, optional: bool) -> &mut Self {
        self.add_source(ConfigSource::JsonFile {
            path: path.into(),
            optional,
        })
    }

    pub fn add_environment_variables(&mut self, prefix: Option<&str>) -> &mut Self {
        self.add_source(ConfigSource::EnvironmentVariables {
            prefix: prefix.map(str::to_owned),
        })
    }

    pub fn sources(&self) -> &[ConfigSource] {
        &self.sources
    }

    /// Loads every source, resolving relative file paths against `content_root`.
    pub fn build(&self, content_root: &Path) -> Result<Configuration, ServiceDefaultsError> {
        let mut figment = Figment::new();

        for source in &self.sources {
            match source {
                ConfigSource::JsonFile { path, optional } => {
                    let path = content_root.join(path);
                    if path.is_file() {
                        figment = figment.merge(CaseInsensitive(Json::file(&path)));
                    } else if *optional {
                        debug!(path = %path.display(), "optional configuration file not found");
                    } else {
                        return Err(ServiceDefaultsError::MissingConfigFile(path));
                    }
                }
                ConfigSource::EnvironmentVariables { prefix } => {
                    let env = match prefix {
                        Some(prefix) => Env::prefixed(prefix),
                        None => Env::raw(),
                    };
                    figment = figment.merge(CaseInsensitive(env.split(ENV_SECTION_SEPARATOR)));
                }
            }
        }

        // Surface malformed files now rather than on the first lookup
        figment.data()?;

        Ok(Configuration { figment })
    }
}

#[derive(Debug, Clone)]
pub struct Configuration {
    figment: Figment,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            figment: Figment::new(),
        }
    }
}

impl Configuration {
    pub fn contains(&self, key: &str) -> bool {
        self.figment.contains(&normalize_key(key))
    }

    /// Deserializes the value or section at `key`, if present.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ServiceDefaultsError> {
        let key = normalize_key(key);
        if !self.figment.contains(&key) {
            return Ok(None);
        }
        Ok(Some(self.figment.extract_inner(&key)?))
    }

    /// Scalar value at `key` rendered as a string. Sections and lists yield `None`.
    pub fn get_string(&self, key: &str) -> Option<String> {
        match self.get::<serde_json::Value>(key).ok()?? {
            serde_json::Value::String(value) => Some(value),
            serde_json::Value::Number(value) => Some(value.to_string()),
            serde_json::Value::Bool(value) => Some(value.to_string()),
            _ => None,
        }
    }

    /// Values at `key`, accepting either a single scalar or a list of scalars.
    pub fn get_strings(&self, key: &str) -> Vec<String> {
        match self.get::<serde_json::Value>(key).ok().flatten() {
            Some(serde_json::Value::Array(values)) => values
                .into_iter()
                .filter_map(|value| match value {
                    serde_json::Value::String(value) => Some(value),
                    serde_json::Value::Number(value) => Some(value.to_string()),
                    _ => None,
                })
                .collect(),
            Some(_) => self.get_string(key).into_iter().collect(),
            None => Vec::new(),
        }
    }

    pub fn figment(&self) -> &Figment {
        &self.figment
    }
}

fn normalize_key(key: &str) -> String {
    key.replace(':', ".").to_lowercase()
}

/// Lower-cases every key of the wrapped provider.
struct CaseInsensitive<P>(P);

impl<P: Provider> Provider for CaseInsensitive<P> {
    fn metadata(&self) -> Metadata {
        self.0.metadata()
    }

    fn data(&self) -> Result<Map<Profile, Dict>, figment::Error> {
        Ok(self
            .0
            .data()?
            .into_iter()
            .map(|(profile, dict)| (profile, lowercase_keys(dict)))
            .collect())
    }

    fn profile(&self) -> Option<Profile> {
        self.0.profile()
    }
}

fn lowercase_keys(dict: Dict) -> Dict {
    dict.into_iter()
        .map(|(key, value)| (key.to_lowercase(), lowercase_value(value)))
        .collect()
}

fn lowercase_value(value: Value) -> Value {
    match value {
        Value::Dict(tag, dict) => Value::Dict(tag, lowercase_keys(dict)),
        Value::Array(tag, values) => {
            Value::Array(tag, values.into_iter().map(lowercase_value).collect())
        }
        other => other,
    }
}
