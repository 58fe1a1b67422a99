//! 全局配置结构（Config）与默认值。
//!
//! 该模块同时提供生成 `config.yml` 的字段元信息。
//!
//! 默认数据目录为用户配置目录下的 `downbook/`，配置依次找 `config.json`、`config.yaml`、`config.yml`。

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::config::{ConfigSpec, FieldMeta};

const APP_DIR: &str = "downbook";

/// 存放配置与日志的目录；取不到用户配置目录时为 `None`（使用当前目录）。
pub fn default_data_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // 保存配置
    #[serde(default)]
    pub out_dir: String,
    #[serde(default)]
    pub out_dir_bib: String,

    // 仓库配置
    #[serde(default = "default_repo")]
    pub default_repo: String,

    // 下载后动作
    #[serde(default)]
    pub exec_cmd: String,

    // 界面配置
    #[serde(default = "default_true")]
    pub term_ui: bool,
    #[serde(default = "default_key_delimiter")]
    pub key_delimiter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            out_dir: String::new(),
            out_dir_bib: String::new(),
            default_repo: default_repo(),
            exec_cmd: String::new(),
            term_ui: default_true(),
            key_delimiter: default_key_delimiter(),
        }
    }
}

impl ConfigSpec for Config {
    const FILE_NAMES: &'static [&'static str] = &["config.json", "config.yaml", "config.yml"];

    fn fields() -> &'static [FieldMeta] {
        static FIELDS: [FieldMeta; 6] = [
            FieldMeta {
                name: "out_dir",
                description: "书籍保存目录（留空为用户配置目录）",
            },
            FieldMeta {
                name: "out_dir_bib",
                description: "BibTeX 引用保存目录（留空为用户配置目录）",
            },
            FieldMeta {
                name: "default_repo",
                description: "默认仓库：libgen",
            },
            FieldMeta {
                name: "exec_cmd",
                description: "下载完成后执行的命令，参数依次为书籍文件与 .bib 文件（留空不执行）",
            },
            FieldMeta {
                name: "term_ui",
                description: "是否使用终端界面（false 为纯命令行）",
            },
            FieldMeta {
                name: "key_delimiter",
                description: "列表中关键列之间的分隔符",
            },
        ];
        &FIELDS
    }
}

impl Config {
    pub fn out_dir(&self) -> PathBuf {
        dir_or_default(&self.out_dir)
    }

    pub fn bib_dir(&self) -> PathBuf {
        dir_or_default(&self.out_dir_bib)
    }

    /// 下载后命令；未配置时为 `None`。
    pub fn exec_cmd(&self) -> Option<&str> {
        Some(self.exec_cmd.trim()).filter(|s| !s.is_empty())
    }
}

/// 留空时依次退到用户配置目录、当前目录。
fn dir_or_default(dir: &str) -> PathBuf {
    if !dir.trim().is_empty() {
        return PathBuf::from(dir);
    }
    dirs::config_dir()
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

fn default_true() -> bool {
    true
}

fn default_repo() -> String {
    "libgen".to_string()
}

fn default_key_delimiter() -> String {
    " | ".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_dirs_fall_back_to_user_config_dir() {
        let cfg = Config::default();
        let expected = dirs::config_dir().unwrap_or_else(|| std::env::current_dir().unwrap());
        assert_eq!(cfg.out_dir(), expected);
        assert_eq!(cfg.bib_dir(), expected);
        assert_eq!(cfg.exec_cmd(), None);
    }

    #[test]
    fn data_dir_is_app_folder_under_user_config_dir() {
        if let Some(dir) = dirs::config_dir() {
            assert_eq!(default_data_dir(), Some(dir.join("downbook")));
        }
    }

    #[test]
    fn configured_values_are_used() {
        let cfg = Config {
            out_dir: "/tmp/books".to_string(),
            out_dir_bib: "/tmp/bib".to_string(),
            exec_cmd: "  zathura ".to_string(),
            ..Config::default()
        };
        assert_eq!(cfg.out_dir(), PathBuf::from("/tmp/books"));
        assert_eq!(cfg.bib_dir(), PathBuf::from("/tmp/bib"));
        assert_eq!(cfg.exec_cmd(), Some("zathura"));
    }

    #[test]
    fn every_field_has_metadata() {
        let value = serde_yaml::to_value(Config::default()).unwrap();
        let serde_yaml::Value::Mapping(map) = value else {
            panic!("config must be a mapping");
        };
        assert_eq!(map.len(), Config::fields().len());
        for field in Config::fields() {
            assert!(map.contains_key(serde_yaml::Value::String(field.name.to_string())));
        }
    }
}
