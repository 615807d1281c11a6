use crate::planner::{is_same_entry, CandidateStatus, RenameCandidate, RenamePlan};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "message", rename_all = "snake_case")]
pub enum ApplyOutcome {
    Renamed,
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppliedFile {
    pub original_path: PathBuf,
    pub target_path: PathBuf,
    pub outcome: ApplyOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ApplyReport {
    pub files: Vec<AppliedFile>,
    pub renamed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub canceled: bool,
}

/// `Pending` の候補だけを計画順に1件ずつリネームする。
///
/// 失敗しても次のファイルへ進む。キャンセルはファイルの合間に確認し、
/// 以降の候補はすべて `Skipped` として記録する。
pub fn apply_plan<F>(plan: &RenamePlan, is_cancelled: F) -> ApplyReport
where
    F: Fn() -> bool,
{
    let mut report = ApplyReport::default();

    for (index, candidate) in plan.candidates.iter().enumerate() {
        if !report.canceled && is_cancelled() {
            info!("バッチがキャンセルされました");
            report.canceled = true;
        }

        let outcome = if report.canceled {
            ApplyOutcome::Skipped("キャンセルされました".to_string())
        } else {
            apply_candidate(candidate, index)
        };

        match &outcome {
            ApplyOutcome::Renamed => report.renamed += 1,
            ApplyOutcome::Skipped(_) => report.skipped += 1,
            ApplyOutcome::Failed(message) => {
                warn!(
                    from = %candidate.original_path.display(),
                    to = %candidate.target_path.display(),
                    error = %message,
                    "リネームに失敗しました"
                );
                report.failed += 1;
            }
        }

        report.files.push(AppliedFile {
            original_path: candidate.original_path.clone(),
            target_path: candidate.target_path.clone(),
            outcome,
        });
    }

    info!(
        renamed = report.renamed,
        skipped = report.skipped,
        failed = report.failed,
        canceled = report.canceled,
        "リネームを適用しました"
    );
    report
}

fn apply_candidate(candidate: &RenameCandidate, index: usize) -> ApplyOutcome {
    match &candidate.status {
        CandidateStatus::Pending => {}
        CandidateStatus::Unchanged => return ApplyOutcome::Skipped("変更なし".to_string()),
        CandidateStatus::Collision => {
            return ApplyOutcome::Skipped("リネーム先が衝突しています".to_string())
        }
        CandidateStatus::Error(message) => return ApplyOutcome::Skipped(message.clone()),
    }

    match rename_in_place(&candidate.original_path, &candidate.target_path, index) {
        Ok(()) => ApplyOutcome::Renamed,
        Err(err) => ApplyOutcome::Failed(format!("{err:#}")),
    }
}

/// 元ファイルと同じフォルダ内でリネームする。既存ファイルは上書きしない。
///
/// 一時名を経由して2段階で動かす。大文字小文字だけ違う名前への変更も
/// 大文字小文字を区別しないファイルシステム上で確実に反映される。
fn rename_in_place(original_path: &Path, target_path: &Path, index: usize) -> Result<()> {
    let target_name = target_path.file_name().with_context(|| {
        format!(
            "リネーム先ファイル名が不正です: {}",
            target_path.display()
        )
    })?;
    let target = original_path.with_file_name(target_name);

    if target != target_path {
        bail!(
            "元ファイルと異なるフォルダへのリネームはできません: {}",
            target_path.display()
        );
    }
    if !original_path.exists() {
        bail!("元ファイルが存在しません: {}", original_path.display());
    }
    if target.exists() && !is_same_entry(&target, original_path) {
        bail!("リネーム先が既に存在します: {}", target.display());
    }

    let temp_path = temp_path_for(original_path, index);
    fs::rename(original_path, &temp_path).with_context(|| {
        format!(
            "一時リネームに失敗しました: {} -> {}",
            original_path.display(),
            temp_path.display()
        )
    })?;

    if let Err(err) = fs::rename(&temp_path, &target) {
        let apply_err = anyhow::Error::from(err).context(format!(
            "最終リネームに失敗しました: {} -> {}",
            temp_path.display(),
            target.display()
        ));
        if let Err(rollback_err) = fs::rename(&temp_path, original_path) {
            return Err(apply_err.context(format!(
                "元の名前への復元にも失敗しました: {rollback_err}"
            )));
        }
        return Err(apply_err);
    }
    Ok(())
}

fn temp_path_for(original_path: &Path, index: usize) -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let file_name = original_path
        .file_name()
        .map(|v| v.to_string_lossy().to_string())
        .unwrap_or_else(|| "file".to_string());
    original_path.with_file_name(format!(".metamorph_tmp_{now}_{index}_{file_name}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::RenameStats;
    use std::cell::Cell;
    use tempfile::tempdir;

    fn candidate(from: PathBuf, to: PathBuf, status: CandidateStatus) -> RenameCandidate {
        RenameCandidate {
            original_path: from,
            target_path: to,
            status,
            overridden: false,
        }
    }

    fn plan(candidates: Vec<RenameCandidate>) -> RenamePlan {
        RenamePlan {
            candidates,
            stats: RenameStats::default(),
        }
    }

    #[test]
    fn renames_pending_and_skips_the_rest() {
        let temp = tempdir().expect("tempdir");
        let a = temp.path().join("a.mkv");
        let b = temp.path().join("b.mkv");
        fs::write(&a, b"A").expect("write a");
        fs::write(&b, b"B").expect("write b");

        let renamed_a = temp.path().join("A.mkv");
        let plan = plan(vec![
            candidate(a.clone(), renamed_a.clone(), CandidateStatus::Pending),
            candidate(b.clone(), b.clone(), CandidateStatus::Unchanged),
        ]);

        let report = apply_plan(&plan, || false);
        assert_eq!(report.renamed, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed, 0);
        assert!(renamed_a.exists());
        assert_eq!(fs::read(&renamed_a).expect("read"), b"A");
        assert!(b.exists());
    }

    #[test]
    fn failure_does_not_stop_the_batch() {
        let temp = tempdir().expect("tempdir");
        let missing = temp.path().join("missing.mkv");
        let c = temp.path().join("c.mkv");
        fs::write(&c, b"C").expect("write c");

        let plan = plan(vec![
            candidate(
                missing,
                temp.path().join("gone.mkv"),
                CandidateStatus::Pending,
            ),
            candidate(c, temp.path().join("C2.mkv"), CandidateStatus::Pending),
        ]);

        let report = apply_plan(&plan, || false);
        assert_eq!(report.failed, 1);
        assert_eq!(report.renamed, 1);
        assert!(matches!(
            &report.files[0].outcome,
            ApplyOutcome::Failed(message) if message.contains("元ファイルが存在しません")
        ));
        assert!(temp.path().join("C2.mkv").exists());
    }

    #[test]
    fn never_overwrites_existing_target() {
        let temp = tempdir().expect("tempdir");
        let a = temp.path().join("a.mkv");
        let taken = temp.path().join("taken.mkv");
        fs::write(&a, b"A").expect("write a");
        fs::write(&taken, b"T").expect("write taken");

        let report = apply_plan(
            &plan(vec![candidate(
                a.clone(),
                taken.clone(),
                CandidateStatus::Pending,
            )]),
            || false,
        );
        assert_eq!(report.failed, 1);
        assert!(a.exists());
        assert_eq!(fs::read(&taken).expect("read"), b"T");
    }

    #[test]
    fn rejects_target_in_other_directory() {
        let temp = tempdir().expect("tempdir");
        let a = temp.path().join("a.mkv");
        fs::write(&a, b"A").expect("write a");
        let outside = temp.path().join("other").join("a.mkv");

        let report = apply_plan(
            &plan(vec![candidate(a.clone(), outside, CandidateStatus::Pending)]),
            || false,
        );
        assert_eq!(report.failed, 1);
        assert!(a.exists());
    }

    #[test]
    fn case_only_rename_leaves_no_staging_file() {
        let temp = tempdir().expect("tempdir");
        let lower = temp.path().join("clip.mkv");
        fs::write(&lower, b"A").expect("write clip");
        let upper = temp.path().join("CLIP.mkv");

        let report = apply_plan(
            &plan(vec![candidate(lower, upper.clone(), CandidateStatus::Pending)]),
            || false,
        );
        assert_eq!(report.renamed, 1);
        assert_eq!(fs::read(&upper).expect("read"), b"A");

        let names: Vec<String> = fs::read_dir(temp.path())
            .expect("read dir")
            .map(|entry| {
                entry
                    .expect("entry")
                    .file_name()
                    .to_string_lossy()
                    .to_string()
            })
            .collect();
        assert_eq!(names, vec!["CLIP.mkv".to_string()]);
    }

    #[test]
    fn temp_path_stays_in_source_directory() {
        let original = Path::new("/tv/clip.mkv");
        let temp = temp_path_for(original, 3);
        assert_eq!(temp.parent(), original.parent());
        let name = temp
            .file_name()
            .map(|v| v.to_string_lossy().to_string())
            .unwrap_or_default();
        assert!(name.starts_with(".metamorph_tmp_"));
        assert!(name.ends_with("_3_clip.mkv"));
    }

    #[test]
    fn cancellation_skips_remaining_files() {
        let temp = tempdir().expect("tempdir");
        let a = temp.path().join("a.mkv");
        let b = temp.path().join("b.mkv");
        fs::write(&a, b"A").expect("write a");
        fs::write(&b, b"B").expect("write b");

        let plan = plan(vec![
            candidate(a, temp.path().join("a2.mkv"), CandidateStatus::Pending),
            candidate(b.clone(), temp.path().join("b2.mkv"), CandidateStatus::Pending),
        ]);

        let calls = Cell::new(0usize);
        let report = apply_plan(&plan, || {
            calls.set(calls.get() + 1);
            calls.get() > 1
        });
        assert!(report.canceled);
        assert_eq!(report.renamed, 1);
        assert_eq!(report.skipped, 1);
        assert!(b.exists());
    }
}
