use crate::metadata::Metadata;
use crate::rule::{Rule, RuleError, RuleKind};
use crate::transform::apply_rule;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// チェーン途中でルールが失敗したときのエラー。失敗直前までのパスを `partial` に持つ。
#[derive(Debug, Error)]
#[error("{position}番目のルール「{rule}」の適用に失敗しました: {source}")]
pub struct ChainError {
    pub position: usize,
    pub rule: String,
    pub partial: PathBuf,
    #[source]
    pub source: RuleError,
}

/// `start + index * increment`。溢れたら飽和させる。
pub fn sequence_number(start: i64, increment: i64, index: usize) -> i64 {
    let index = i64::try_from(index).unwrap_or(i64::MAX);
    start.saturating_add(index.saturating_mul(increment))
}

/// 有効なルールを先頭から順に畳み込む。
///
/// `numbering` に出会った時点で連番を計算し、そのルール自身と後続のルールに渡す。
/// `new_name` の後にルールが続く場合、後続はその結果に対してさらに適用される。
/// 入力が同じなら結果も同じ(`{date:...}` が読むファイル更新日時を除く)。
pub fn evaluate(
    rules: &[Rule],
    path: &Path,
    index: usize,
    metadata: &Metadata,
) -> Result<PathBuf, ChainError> {
    let mut current = path.to_path_buf();
    let mut seqnum: Option<i64> = None;

    for (position, rule) in rules.iter().enumerate() {
        if !rule.enabled {
            continue;
        }
        if let RuleKind::Numbering {
            start, increment, ..
        } = &rule.kind
        {
            seqnum = Some(sequence_number(*start, *increment, index));
        }

        match apply_rule(rule, &current, seqnum, Some(metadata)) {
            Ok(next) => {
                debug!(
                    rule = %rule.display_name(),
                    from = %current.display(),
                    to = %next.display(),
                    "ルールを適用しました"
                );
                current = next;
            }
            Err(source) => {
                warn!(
                    rule = %rule.display_name(),
                    path = %path.display(),
                    error = %source,
                    "ルールの適用に失敗しました"
                );
                return Err(ChainError {
                    position: position + 1,
                    rule: rule.display_name(),
                    partial: current,
                    source,
                });
            }
        }
    }

    Ok(current)
}

/// プレビュー用の評価。ファイルシステムは変更しない。
pub fn evaluate_preview(
    rules: &[Rule],
    path: &Path,
    index: usize,
    metadata: &Metadata,
) -> Result<PathBuf, ChainError> {
    evaluate(rules, path, index, metadata)
}
