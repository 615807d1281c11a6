use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

/// 外部ソース(エピソード情報・CSV)から取り込んだ値。テンプレートでは文字列として展開する。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaValue::Bool(v) => write!(f, "{v}"),
            MetaValue::Int(v) => write!(f, "{v}"),
            MetaValue::Float(v) => write!(f, "{v}"),
            MetaValue::Text(v) => f.write_str(v),
        }
    }
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        MetaValue::Text(value.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(value: String) -> Self {
        MetaValue::Text(value)
    }
}

impl From<i64> for MetaValue {
    fn from(value: i64) -> Self {
        MetaValue::Int(value)
    }
}

/// キー順を固定するため BTreeMap を使う。
pub type Metadata = BTreeMap<String, MetaValue>;

/// 後ろのソースほど優先してマージする。
pub fn merge_metadata<'a, I>(sources: I) -> Metadata
where
    I: IntoIterator<Item = &'a Metadata>,
{
    let mut merged = Metadata::new();
    for source in sources {
        for (key, value) in source {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EpisodeInfo {
    pub show: String,
    pub season: i64,
    #[serde(default)]
    pub year: Option<String>,
    pub episode: i64,
    pub title: String,
}

impl EpisodeInfo {
    pub fn to_metadata(&self) -> Metadata {
        let year = self
            .year
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or("N/A");

        let mut meta = Metadata::new();
        meta.insert("show".to_string(), MetaValue::from(self.show.as_str()));
        meta.insert("season".to_string(), MetaValue::Int(self.season));
        meta.insert("year".to_string(), MetaValue::from(year));
        meta.insert("episode".to_string(), MetaValue::Int(self.episode));
        meta.insert("title".to_string(), MetaValue::from(self.title.as_str()));
        meta
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CsvTable {
    #[serde(default)]
    pub headers: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<String>>,
}

/// CSVの1行を `{header}` / `{Csv:<n>}` / `{Csv:<header>}` で参照できる形にする。
pub fn csv_row_metadata(headers: &[String], row: &[String]) -> Metadata {
    let mut meta = Metadata::new();
    for (i, value) in row.iter().enumerate() {
        let header = headers
            .get(i)
            .map(|h| normalize_header(h))
            .unwrap_or_else(|| format!("Col{}", i + 1));
        meta.insert(header.clone(), MetaValue::from(value.as_str()));
        meta.insert(format!("Csv:{}", i + 1), MetaValue::from(value.as_str()));
        meta.insert(format!("Csv:{header}"), MetaValue::from(value.as_str()));
    }
    meta
}

// "1:Title" -> "Title"
fn normalize_header(header: &str) -> String {
    match header.split_once(':') {
        Some((_, rest)) if !rest.trim().is_empty() => rest.trim().to_string(),
        _ => header.to_string(),
    }
}

/// ファイル名ごとのメタデータ。CSV がエピソード情報より優先される。
#[derive(Debug, Clone, Default)]
pub struct MetadataStore {
    episodes: HashMap<String, Metadata>,
    csv_rows: HashMap<String, Metadata>,
}

impl MetadataStore {
    /// i 番目のエピソードを i 番目のファイルに割り当てる。割り当て件数を返す。
    pub fn assign_episodes(&mut self, files: &[PathBuf], episodes: &[EpisodeInfo]) -> usize {
        let mut assigned = 0usize;
        for (file, episode) in files.iter().zip(episodes) {
            self.episodes
                .insert(file_name_key(file), episode.to_metadata());
            assigned += 1;
        }
        assigned
    }

    /// 既存のCSV割り当ては破棄してから読み直す。
    pub fn assign_csv_rows(&mut self, files: &[PathBuf], table: &CsvTable) -> usize {
        self.csv_rows.clear();
        for (file, row) in files.iter().zip(&table.rows) {
            self.csv_rows
                .insert(file_name_key(file), csv_row_metadata(&table.headers, row));
        }
        self.csv_rows.len()
    }

    pub fn for_file(&self, file_name: &str) -> Metadata {
        let sources = [self.episodes.get(file_name), self.csv_rows.get(file_name)];
        merge_metadata(sources.into_iter().flatten())
    }

    pub fn for_path(&self, path: &Path) -> Metadata {
        self.for_file(&file_name_key(path))
    }

    pub fn is_empty(&self) -> bool {
        self.episodes.is_empty() && self.csv_rows.is_empty()
    }
}

/// `--metadata` で渡す取り込みファイル。どちらも並び順でファイルに対応づける。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataImport {
    #[serde(default)]
    pub episodes: Vec<EpisodeInfo>,
    #[serde(default)]
    pub csv: Option<CsvTable>,
}

impl MetadataImport {
    pub fn into_store(self, files: &[PathBuf]) -> MetadataStore {
        let mut store = MetadataStore::default();
        store.assign_episodes(files, &self.episodes);
        if let Some(table) = self.csv.as_ref() {
            store.assign_csv_rows(files, table);
        }
        store
    }
}

fn file_name_key(path: &Path) -> String {
    path.file_name()
        .map(|v| v.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn episode(n: i64, title: &str) -> EpisodeInfo {
        EpisodeInfo {
            show: "Firefly".to_string(),
            season: 1,
            year: Some("2002".to_string()),
            episode: n,
            title: title.to_string(),
        }
    }

    #[test]
    fn merge_prefers_later_sources() {
        let mut first = Metadata::new();
        first.insert("title".to_string(), MetaValue::from("old"));
        first.insert("season".to_string(), MetaValue::Int(1));
        let mut second = Metadata::new();
        second.insert("title".to_string(), MetaValue::from("new"));

        let merged = merge_metadata([&first, &second]);
        assert_eq!(merged.get("title"), Some(&MetaValue::from("new")));
        assert_eq!(merged.get("season"), Some(&MetaValue::Int(1)));
    }

    #[test]
    fn csv_row_registers_three_keys_per_cell() {
        let headers = vec!["1:Title".to_string(), "Code".to_string()];
        let row = vec!["Pilot".to_string(), "S01E01".to_string(), "extra".to_string()];
        let meta = csv_row_metadata(&headers, &row);

        assert_eq!(meta.get("Title"), Some(&MetaValue::from("Pilot")));
        assert_eq!(meta.get("Csv:1"), Some(&MetaValue::from("Pilot")));
        assert_eq!(meta.get("Csv:Title"), Some(&MetaValue::from("Pilot")));
        assert_eq!(meta.get("Csv:Code"), Some(&MetaValue::from("S01E01")));
        assert_eq!(meta.get("Col3"), Some(&MetaValue::from("extra")));
        assert_eq!(meta.get("Csv:3"), Some(&MetaValue::from("extra")));
    }

    #[test]
    fn episode_metadata_falls_back_to_na_year() {
        let mut ep = episode(2, "The Train Job");
        ep.year = None;
        let meta = ep.to_metadata();
        assert_eq!(meta.get("year"), Some(&MetaValue::from("N/A")));
        assert_eq!(meta.get("episode"), Some(&MetaValue::Int(2)));
    }

    #[test]
    fn store_maps_by_position_and_csv_wins() {
        let files = vec![PathBuf::from("/v/a.mkv"), PathBuf::from("/v/b.mkv")];
        let mut store = MetadataStore::default();
        let assigned = store.assign_episodes(
            &files,
            &[episode(1, "Serenity"), episode(2, "The Train Job"), episode(3, "Bushwhacked")],
        );
        assert_eq!(assigned, 2);

        let table = CsvTable {
            headers: vec!["title".to_string()],
            rows: vec![vec!["Override".to_string()]],
        };
        assert_eq!(store.assign_csv_rows(&files, &table), 1);

        let a = store.for_file("a.mkv");
        assert_eq!(a.get("title"), Some(&MetaValue::from("Override")));
        assert_eq!(a.get("show"), Some(&MetaValue::from("Firefly")));

        let b = store.for_path(Path::new("/elsewhere/b.mkv"));
        assert_eq!(b.get("title"), Some(&MetaValue::from("The Train Job")));
        assert!(store.for_file("c.mkv").is_empty());
    }

    #[test]
    fn import_parses_json_shape() {
        let raw = r#"{
            "episodes": [{"show": "Firefly", "season": 1, "episode": 1, "title": "Serenity"}],
            "csv": {"headers": ["Title"], "rows": [["Pilot"]]}
        }"#;
        let import: MetadataImport = serde_json::from_str(raw).expect("must parse");
        let store = import.into_store(&[PathBuf::from("x.mkv")]);
        let meta = store.for_file("x.mkv");
        assert_eq!(meta.get("Csv:1"), Some(&MetaValue::from("Pilot")));
        assert_eq!(meta.get("season"), Some(&MetaValue::Int(1)));
    }
}
