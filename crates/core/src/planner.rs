use crate::chain::evaluate_preview;
use crate::metadata::MetadataStore;
use crate::rule::Rule;
use crate::sanitize::{sanitize_filename, with_file_name};
use crate::template::split_name_ext;
use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use walkdir::WalkDir;

#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    /// 元ファイル名 -> 新ファイル名。ルールの結果より優先する。
    pub overrides: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum CandidateStatus {
    Pending,
    Unchanged,
    Collision,
    Error(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameCandidate {
    pub original_path: PathBuf,
    pub target_path: PathBuf,
    pub status: CandidateStatus,
    pub overridden: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RenameStats {
    pub planned: usize,
    pub pending: usize,
    pub unchanged: usize,
    pub collisions: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenamePlan {
    pub candidates: Vec<RenameCandidate>,
    pub stats: RenameStats,
}

/// ファイル一覧にルールチェーンを適用してプレビューを作る。ファイルは変更しない。
///
/// チェーン評価はファイルごとに独立しているので並列に回し、衝突判定だけ順番に行う。
pub fn generate_plan(
    files: &[PathBuf],
    rules: &[Rule],
    store: &MetadataStore,
    options: &PlanOptions,
) -> RenamePlan {
    let resolved: Vec<(PathBuf, bool, Option<String>)> = files
        .par_iter()
        .enumerate()
        .map(|(index, file)| resolve_target(file, index, rules, store, options))
        .collect();

    let mut stats = RenameStats::default();
    let mut planned_paths = HashSet::<PathBuf>::new();
    let mut candidates = Vec::with_capacity(files.len());

    for (original, (target, overridden, error)) in files.iter().zip(resolved) {
        let status = match error {
            Some(message) => CandidateStatus::Error(message),
            None if &target == original => CandidateStatus::Unchanged,
            None if !is_available(&target, original, &planned_paths) => CandidateStatus::Collision,
            None => CandidateStatus::Pending,
        };

        match &status {
            CandidateStatus::Pending => stats.pending += 1,
            CandidateStatus::Unchanged => stats.unchanged += 1,
            CandidateStatus::Collision => stats.collisions += 1,
            CandidateStatus::Error(_) => stats.errors += 1,
        }
        if !matches!(status, CandidateStatus::Error(_)) {
            planned_paths.insert(target.clone());
        }

        stats.planned += 1;
        candidates.push(RenameCandidate {
            original_path: original.clone(),
            target_path: target,
            status,
            overridden,
        });
    }

    info!(
        planned = stats.planned,
        pending = stats.pending,
        unchanged = stats.unchanged,
        collisions = stats.collisions,
        errors = stats.errors,
        "プレビューを作成しました"
    );

    RenamePlan { candidates, stats }
}

fn resolve_target(
    file: &Path,
    index: usize,
    rules: &[Rule],
    store: &MetadataStore,
    options: &PlanOptions,
) -> (PathBuf, bool, Option<String>) {
    let Some(file_name) = file.file_name().and_then(|v| v.to_str()) else {
        return (
            file.to_path_buf(),
            false,
            Some(format!(
                "ファイル名がUTF-8ではないため変換できません: {}",
                file.display()
            )),
        );
    };

    if let Some(name) = options
        .overrides
        .get(file_name)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
    {
        return (override_target(file, name), true, None);
    }

    let metadata = store.for_file(file_name);
    match evaluate_preview(rules, file, index, &metadata) {
        Ok(target) => (same_directory(file, &target), false, None),
        Err(err) => (
            same_directory(file, &err.partial),
            false,
            Some(err.to_string()),
        ),
    }
}

// 拡張子を省略した上書き名には元の拡張子を補う。
fn override_target(file: &Path, name: &str) -> PathBuf {
    let mut name = sanitize_filename(name);
    if !name.contains('.') {
        let (_, ext) = split_name_ext(file);
        if !ext.is_empty() {
            name = format!("{name}.{ext}");
        }
    }
    with_file_name(file, &name)
}

fn same_directory(original: &Path, target: &Path) -> PathBuf {
    match target.file_name() {
        Some(name) => original.with_file_name(name),
        None => original.to_path_buf(),
    }
}

fn is_available(candidate: &Path, original_path: &Path, planned_paths: &HashSet<PathBuf>) -> bool {
    if planned_paths.contains(candidate) {
        return false;
    }
    if candidate == original_path {
        return true;
    }
    !candidate.exists() || is_same_entry(candidate, original_path)
}

/// 大文字小文字だけが違う名前が同じファイルを指しているか。
///
/// 大文字小文字を区別しないファイルシステムでは `CLIP.mkv` の存在確認が
/// 元の `clip.mkv` に当たるため、衝突ではなく同一ファイルとして扱う。
pub(crate) fn is_same_entry(a: &Path, b: &Path) -> bool {
    if a.parent() != b.parent() {
        return false;
    }
    let same_name_ignoring_case = match (a.file_name(), b.file_name()) {
        (Some(x), Some(y)) => {
            x.to_string_lossy().to_lowercase() == y.to_string_lossy().to_lowercase()
        }
        _ => false,
    };
    if !same_name_ignoring_case {
        return false;
    }
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(x), Ok(y)) if x == y => true,
        _ => same_inode(a, b),
    }
}

#[cfg(unix)]
fn same_inode(a: &Path, b: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;
    match (fs::metadata(a), fs::metadata(b)) {
        (Ok(x), Ok(y)) => x.dev() == y.dev() && x.ino() == y.ino(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn same_inode(_a: &Path, _b: &Path) -> bool {
    false
}

/// 入力がファイルならそれだけ、フォルダなら中のファイルを名前順に返す。
/// `extensions` が空なら拡張子で絞り込まない。
pub fn collect_media_files(
    root: &Path,
    recursive: bool,
    include_hidden: bool,
    extensions: &[String],
) -> Result<Vec<PathBuf>> {
    if root.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }
    if !root.exists() {
        anyhow::bail!("入力フォルダが存在しません: {}", root.display());
    }

    let mut out = Vec::new();
    let mut skipped = 0usize;

    if recursive {
        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                include_hidden || entry.depth() == 0 || !is_hidden(entry.path())
            });
        for entry in walker {
            let entry =
                entry.with_context(|| format!("フォルダ走査に失敗しました: {}", root.display()))?;
            let path = entry.path();
            if !entry.file_type().is_file() {
                continue;
            }
            if accept(path, include_hidden, extensions) {
                out.push(path.to_path_buf());
            } else {
                skipped += 1;
            }
        }
    } else {
        for entry in fs::read_dir(root)
            .with_context(|| format!("フォルダを読めませんでした: {}", root.display()))?
        {
            let entry =
                entry.with_context(|| format!("エントリ読み取り失敗: {}", root.display()))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if accept(&path, include_hidden, extensions) {
                out.push(path);
            } else {
                skipped += 1;
            }
        }
        out.sort();
    }

    info!(
        root = %root.display(),
        collected = out.len(),
        skipped,
        "入力ファイルを収集しました"
    );
    Ok(out)
}

fn accept(path: &Path, include_hidden: bool, extensions: &[String]) -> bool {
    if is_hidden(path) && !include_hidden {
        return false;
    }
    has_extension(path, extensions)
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    if extensions.is_empty() {
        return true;
    }
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy();
            extensions
                .iter()
                .any(|allowed| ext.eq_ignore_ascii_case(allowed.trim_start_matches('.')))
        })
        .unwrap_or(false)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}
