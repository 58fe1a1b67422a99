//! 配置文件：定位、读取、与默认值合并、补全回写。
//!
//! YAML 为默认格式，写出时每个字段上方带说明注释；`.json` 结尾的路径按 JSON 读写。
//! 合并统一在 `serde_yaml::Value` 上进行。

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_yaml::{Mapping, Value};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("invalid yaml at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("invalid json at {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("validation error: {0}")]
    Validation(String),
}

/// 配置字段名与写入文件时的注释。
#[derive(Debug, Clone, Copy)]
pub struct FieldMeta {
    pub name: &'static str,
    pub description: &'static str,
}

pub trait ConfigSpec: Serialize + DeserializeOwned + Default {
    /// 按顺序查找，首个存在的生效；都不存在时写出最后一个。
    const FILE_NAMES: &'static [&'static str];
    fn fields() -> &'static [FieldMeta];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Yaml,
    Json,
}

/// 一个具体位置上的配置文件。
#[derive(Debug, Clone)]
struct ConfigFile {
    path: PathBuf,
    format: Format,
}

impl ConfigFile {
    /// 显式路径优先，其次 `base_dir` 下的候选文件，最后当前目录。
    fn locate<T: ConfigSpec>(explicit: Option<&Path>, base_dir: Option<&Path>) -> Self {
        let path = match explicit {
            Some(p) => p.to_path_buf(),
            None => Self::pick::<T>(base_dir.unwrap_or(Path::new(""))),
        };
        let format = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Format::Json,
            _ => Format::Yaml,
        };
        Self { path, format }
    }

    fn pick<T: ConfigSpec>(dir: &Path) -> PathBuf {
        T::FILE_NAMES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file())
            .or_else(|| T::FILE_NAMES.last().map(|name| dir.join(name)))
            .unwrap_or_else(|| dir.join("config.yml"))
    }

    fn io_error(&self, source: io::Error) -> ConfigError {
        ConfigError::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// 文件不存在时返回 `None`。
    fn read(&self) -> Result<Option<Value>, ConfigError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(self.io_error(err)),
        };
        let value = match self.format {
            Format::Yaml => serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: self.path.clone(),
                source,
            })?,
            Format::Json => {
                let json: serde_json::Value =
                    serde_json::from_str(&raw).map_err(|source| ConfigError::Json {
                        path: self.path.clone(),
                        source,
                    })?;
                to_value(&json)?
            }
        };
        Ok(Some(value))
    }

    fn write<T: ConfigSpec>(&self, config: &T) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let text = match self.format {
            Format::Yaml => generate_yaml_with_comments(config)?,
            Format::Json => serde_json::to_string_pretty(config)
                .map_err(|err| ConfigError::Validation(err.to_string()))?,
        };
        fs::write(&self.path, text).map_err(|err| self.io_error(err))
    }
}

fn to_value<S: Serialize>(value: &S) -> Result<Value, ConfigError> {
    serde_yaml::to_value(value).map_err(|err| ConfigError::Validation(err.to_string()))
}

/// 读取配置；文件不存在时写出默认配置，缺字段时补全后回写。
pub fn load_or_create<T: ConfigSpec>(
    config_path: Option<&Path>,
    base_dir: Option<&Path>,
) -> Result<T, ConfigError> {
    let file = ConfigFile::locate::<T>(config_path, base_dir);

    let Some(user) = file.read()? else {
        let config = T::default();
        file.write(&config)?;
        info!(target: "startup", "已创建默认配置 {}", file.path.display());
        return Ok(config);
    };

    let unknown = unknown_fields::<T>(&user);
    if !unknown.is_empty() {
        warn!(target: "startup", "配置中有无法识别的字段（已忽略）: {}", unknown.join(", "));
    }
    let missing = missing_fields::<T>(&user);

    let mut merged = to_value(&T::default())?;
    merge_values(&mut merged, user);
    let config: T =
        serde_yaml::from_value(merged).map_err(|err| ConfigError::Validation(err.to_string()))?;

    if !missing.is_empty() {
        file.write(&config)?;
        info!(target: "startup", "配置补全字段: {}", missing.join(", "));
    }
    Ok(config)
}

/// 按 `fields()` 的顺序输出，每个字段上方是它的说明。
pub fn generate_yaml_with_comments<T: ConfigSpec>(config: &T) -> Result<String, ConfigError> {
    let Value::Mapping(mapping) = to_value(config)? else {
        return Err(ConfigError::Validation(
            "config must serialize to a mapping".to_string(),
        ));
    };

    let mut out = String::new();
    for field in T::fields() {
        for line in field.description.lines() {
            out.push_str("# ");
            out.push_str(line);
            out.push('\n');
        }
        let key = Value::String(field.name.to_string());
        let val = mapping.get(&key).cloned().unwrap_or(Value::Null);
        let entry = serde_yaml::to_string(&Mapping::from_iter([(key, val)]))
            .map_err(|err| ConfigError::Validation(err.to_string()))?;
        out.push_str(entry.trim_end());
        out.push_str("\n\n");
    }
    Ok(out)
}

fn user_keys(user: &Value) -> Vec<String> {
    match user {
        Value::Mapping(map) => map
            .keys()
            .filter_map(|k| k.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

fn missing_fields<T: ConfigSpec>(user: &Value) -> Vec<&'static str> {
    let keys = user_keys(user);
    T::fields()
        .iter()
        .map(|f| f.name)
        .filter(|name| !keys.iter().any(|k| k.as_str() == *name))
        .collect()
}

fn unknown_fields<T: ConfigSpec>(user: &Value) -> Vec<String> {
    user_keys(user)
        .into_iter()
        .filter(|k| !T::fields().iter().any(|f| f.name == k.as_str()))
        .collect()
}

/// 用户值覆盖默认值；映射逐键递归，`null` 保留默认。
fn merge_values(default: &mut Value, user: Value) {
    match (default, user) {
        (_, Value::Null) => {}
        (Value::Mapping(dest), Value::Mapping(src)) => {
            for (key, user_val) in src {
                match dest.get_mut(&key) {
                    Some(dest_val) => merge_values(dest_val, user_val),
                    None => {
                        dest.insert(key, user_val);
                    }
                }
            }
        }
        (dest, other) => *dest = other,
    }
}
