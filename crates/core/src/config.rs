use crate::metadata::MetadataImport;
use crate::rule::Rule;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_MEDIA_EXTENSIONS: &[&str] = &[
    "mkv", "mp4", "m4v", "avi", "mov", "wmv", "webm", "ts", "m2ts", "mpg", "mpeg", "flv",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub media_extensions: Vec<String>,
    pub recursive_default: bool,
    pub include_hidden_default: bool,
    pub rules: Vec<Rule>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            media_extensions: DEFAULT_MEDIA_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            recursive_default: false,
            include_hidden_default: false,
            rules: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub config_path: PathBuf,
}

/// ルールファイルの中身。`[[rules]]` の並びがそのまま適用順になる。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub rules: Vec<Rule>,
}

pub fn app_paths() -> Result<AppPaths> {
    let proj = ProjectDirs::from("com", "metamorph", "metamorph")
        .context("OS標準設定ディレクトリを取得できませんでした")?;
    let config_dir = proj.config_dir().to_path_buf();
    Ok(AppPaths {
        config_path: config_dir.join("config.toml"),
        config_dir,
    })
}

pub fn load_config() -> Result<AppConfig> {
    let paths = app_paths()?;
    load_config_from(&paths.config_path)
}

pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }

    let raw = fs::read_to_string(path)
        .with_context(|| format!("設定ファイルを読めませんでした: {}", path.display()))?;
    let config = toml::from_str::<AppConfig>(&raw).context("設定ファイルのパースに失敗しました")?;
    Ok(config)
}

pub fn save_config(config: &AppConfig) -> Result<()> {
    let paths = app_paths()?;
    fs::create_dir_all(&paths.config_dir).with_context(|| {
        format!(
            "設定ディレクトリを作成できませんでした: {}",
            paths.config_dir.display()
        )
    })?;
    let body = toml::to_string_pretty(config).context("設定のシリアライズに失敗しました")?;
    fs::write(&paths.config_path, body).with_context(|| {
        format!(
            "設定ファイルを書き込めませんでした: {}",
            paths.config_path.display()
        )
    })?;
    Ok(())
}

pub fn load_rules(path: &Path) -> Result<Vec<Rule>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("ルールファイルを読めませんでした: {}", path.display()))?;
    let set = toml::from_str::<RuleSet>(&raw)
        .with_context(|| format!("ルールファイルのパースに失敗しました: {}", path.display()))?;
    Ok(set.rules)
}

pub fn save_rules(path: &Path, rules: &[Rule]) -> Result<()> {
    let set = RuleSet {
        rules: rules.to_vec(),
    };
    let body = toml::to_string_pretty(&set).context("ルールのシリアライズに失敗しました")?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| {
            format!("フォルダを作成できませんでした: {}", parent.display())
        })?;
    }
    fs::write(path, body)
        .with_context(|| format!("ルールファイルを書き込めませんでした: {}", path.display()))?;
    Ok(())
}

pub fn load_metadata_import(path: &Path) -> Result<MetadataImport> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("メタデータファイルを読めませんでした: {}", path.display()))?;
    let import = serde_json::from_str::<MetadataImport>(&raw)
        .with_context(|| format!("メタデータファイルのパースに失敗しました: {}", path.display()))?;
    Ok(import)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{CaseMode, RuleKind};
    use tempfile::tempdir;

    #[test]
    fn load_rules_reads_toml_chain_in_order() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("rules.toml");
        fs::write(
            &path,
            r#"
[[rules]]
type = "Numbering"
params = { template = "{name}_{num:2}", start = 3 }

[[rules]]
type = "change_case"
enabled = false
name = "shout"

[rules.params]
mode = "upper"
"#,
        )
        .expect("write rules");

        let rules = load_rules(&path).expect("load rules");
        assert_eq!(rules.len(), 2);
        assert_eq!(
            rules[0].kind,
            RuleKind::Numbering {
                template: "{name}_{num:2}".to_string(),
                start: 3,
                increment: 1,
            }
        );
        assert!(!rules[1].enabled);
        assert_eq!(rules[1].display_name(), "shout");
        assert_eq!(
            rules[1].kind,
            RuleKind::ChangeCase {
                mode: CaseMode::Upper
            }
        );
    }

    #[test]
    fn save_then_load_rules() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("rules.toml");
        let rules = vec![
            Rule::new(RuleKind::Replace {
                old: "x264".to_string(),
                new: String::new(),
                case_sensitive: false,
                use_tags: false,
            }),
            Rule::new(RuleKind::ChangeExt {
                ext: "mp4".to_string(),
            })
            .disabled(),
        ];

        save_rules(&path, &rules).expect("save");
        let loaded = load_rules(&path).expect("load");
        assert_eq!(loaded, rules);
    }

    #[test]
    fn load_rules_reports_unknown_kind() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("rules.toml");
        fs::write(&path, "[[rules]]\ntype = \"shuffle\"\n").expect("write rules");
        let err = load_rules(&path).expect_err("must fail");
        assert!(err.to_string().contains("ルールファイルのパースに失敗しました"));
    }

    #[test]
    fn missing_config_file_gives_defaults() {
        let temp = tempdir().expect("tempdir");
        let config = load_config_from(&temp.path().join("config.toml")).expect("load");
        assert!(config.media_extensions.iter().any(|ext| ext == "mkv"));
        assert!(config.rules.is_empty());
    }

    #[test]
    fn partial_config_fills_defaults() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "recursive_default = true\n").expect("write config");
        let config = load_config_from(&path).expect("load");
        assert!(config.recursive_default);
        assert!(!config.media_extensions.is_empty());
    }

    #[test]
    fn load_metadata_import_reads_json() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("meta.json");
        fs::write(
            &path,
            r#"{"csv": {"headers": ["Title"], "rows": [["Pilot"]]}}"#,
        )
        .expect("write metadata");
        let import = load_metadata_import(&path).expect("load");
        assert!(import.episodes.is_empty());
        assert_eq!(import.csv.map(|t| t.rows.len()), Some(1));
    }
}
