use crate::error::Error;
use ::config::{Config, ConfigError};

// Looks up `{name}.{key}` and falls back to `{key}`. Only a missing key
// falls through; a present but unconvertible value is reported as-is.
pub(crate) fn get_namespaced_value<T, F>(
    config: &Config,
    name: &str,
    key: &str,
    getter: F,
) -> Result<T, ConfigError>
where
    F: Fn(&Config, &str) -> Result<T, ConfigError>,
{
    if name.is_empty() {
        getter(config, key)
    } else {
        match getter(config, &format!("{name}.{key}")) {
            Err(ConfigError::NotFound(_)) => getter(config, key),
            other => other,
        }
    }
}

fn namespaced_or<T, F>(
    config: &Config,
    name: &str,
    key: &str,
    default: T,
    getter: F,
) -> Result<T, Error>
where
    F: Fn(&Config, &str) -> Result<T, ConfigError>,
{
    match get_namespaced_value(config, name, key, getter) {
        Ok(value) => Ok(value),
        Err(ConfigError::NotFound(_)) => Ok(default),
        Err(err) => Err(Error::Config(err)),
    }
}

pub(crate) fn get_namespaced_string(
    config: &Config,
    name: &str,
    key: &str,
) -> Result<Option<String>, Error> {
    namespaced_or(config, name, key, None, |cfg, key| {
        cfg.get_string(key).map(Some)
    })
}

pub(crate) fn get_namespaced_string_or(
    config: &Config,
    name: &str,
    key: &str,
    default: &str,
) -> Result<String, Error> {
    Ok(get_namespaced_string(config, name, key)?.unwrap_or_else(|| default.to_string()))
}

pub(crate) fn get_namespaced_bool_or(
    config: &Config,
    name: &str,
    key: &str,
    default: bool,
) -> Result<bool, Error> {
    namespaced_or(config, name, key, default, Config::get_bool)
}

pub(crate) fn get_namespaced_i64_or(
    config: &Config,
    name: &str,
    key: &str,
    default: i64,
) -> Result<i64, Error> {
    namespaced_or(config, name, key, default, Config::get_int)
}

pub(crate) fn get_namespaced_f64_or(
    config: &Config,
    name: &str,
    key: &str,
    default: f64,
) -> Result<f64, Error> {
    namespaced_or(config, name, key, default, Config::get_float)
}

pub(crate) fn get_namespaced_usize_or(
    config: &Config,
    name: &str,
    key: &str,
    default: usize,
) -> Result<usize, Error> {
    let value = get_namespaced_i64_or(config, name, key, default as i64)?;
    usize::try_from(value).map_err(|_| Error::InvalidParameter {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Layers URI query parameters over a base configuration.
///
/// Parameters override whatever the base holds for the same key, so a value
/// given on a broker URI always wins over application defaults.
pub(crate) fn with_parameters(base: &Config, params: &[(String, String)]) -> Result<Config, Error> {
    if params.is_empty() {
        return Ok(base.clone());
    }
    let mut builder = Config::builder().add_source(base.clone());
    for (key, value) in params {
        builder = builder.set_override(key.as_str(), value.as_str())?;
    }
    Ok(builder.build()?)
}
