use std::{fmt::Write, path::Path, str::FromStr};

use anyhow::bail;
use indoc::indoc;
use serde::Deserialize;
use serde_dynamic_string::DynamicString;
use toml::Value;

use crate::Config;

/// Fields that may reference an unset environment variable. They are dropped instead of
/// failing the whole load, so the server can still start in health-only mode.
const OPTIONAL_FIELDS: &[&str] = &["database.url"];

fn is_optional_field(path: &str) -> bool {
    OPTIONAL_FIELDS.contains(&path)
}

/// Remove a field from the TOML configuration by path
fn remove_field_from_config(config: &mut Value, path: &str) {
    let parts: Vec<&str> = path.split('.').collect();

    let Some((last, parents)) = parts.split_last() else {
        return;
    };

    let mut current = config;

    for part in parents {
        match current.as_table_mut().and_then(|table| table.get_mut(*part)) {
            Some(value) => current = value,
            None => return,
        }
    }

    if let Some(table) = current.as_table_mut() {
        table.remove(*last);
        log::warn!("Ignoring '{path}': its environment variable could not be expanded");
    }
}

pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read configuration file {}: {e}", path.display()))?;

    parse(&content)
}

pub(crate) fn parse(content: &str) -> anyhow::Result<Config> {
    let mut raw_config: Value = toml::from_str(content)?;

    // Optional fields are retried once without the offending value.
    let expanded = expand_dynamic_strings(&mut Vec::new(), &mut raw_config);

    if let Err(err) = expanded {
        match err.path {
            Some(ref path) if is_optional_field(path) => {
                remove_field_from_config(&mut raw_config, path);
                expand_dynamic_strings(&mut Vec::new(), &mut raw_config).map_err(|err| err.error)?;
            }
            _ => return Err(err.error),
        }
    }

    let config = Config::deserialize(raw_config)?;
    validate(&config)?;

    if config.database.url.is_none() {
        log::warn!("No database URL configured, requests are served without a bound database target");
    }

    Ok(config)
}

pub(crate) fn validate(config: &Config) -> anyhow::Result<()> {
    let pool = &config.database.pool;

    if pool.max_size == 0 {
        bail!(indoc! {r#"
            database.pool.max_size must be greater than zero.

            Example configuration:

              [database.pool]
              min_size = 1
              max_size = 10
        "#});
    }

    if pool.min_size > pool.max_size {
        bail!(
            "database.pool.min_size ({}) must not exceed database.pool.max_size ({})",
            pool.min_size,
            pool.max_size
        );
    }

    Ok(())
}

struct ExpandError {
    path: Option<String>,
    error: anyhow::Error,
}

fn expand_dynamic_strings<'a>(
    path: &mut Vec<Result<&'a str, usize>>,
    value: &'a mut Value,
) -> Result<(), ExpandError> {
    match value {
        Value::String(s) => match DynamicString::<String>::from_str(s) {
            Ok(out) => *s = out.into_inner(),
            Err(err) => {
                let mut p = String::new();
                for segment in path.iter() {
                    match segment {
                        Ok(s) => {
                            p.push_str(s);
                            p.push('.');
                        }
                        Err(i) => {
                            let _ = write!(p, "[{i}]");
                        }
                    }
                }
                if p.ends_with('.') {
                    p.pop();
                }

                return Err(ExpandError {
                    error: anyhow::anyhow!("Failed to expand dynamic string at path '{p}': {err}"),
                    path: Some(p),
                });
            }
        },
        Value::Array(values) => {
            for (i, value) in values.iter_mut().enumerate() {
                path.push(Err(i));
                expand_dynamic_strings(path, value)?;
                path.pop();
            }
        }
        Value::Table(map) => {
            for (key, value) in map {
                path.push(Ok(key.as_str()));
                expand_dynamic_strings(path, value)?;
                path.pop();
            }
        }
        Value::Integer(_) | Value::Float(_) | Value::Boolean(_) | Value::Datetime(_) => (),
    }

    Ok(())
}
