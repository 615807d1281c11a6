use crate::metadata::Metadata;
use crate::rule::{CaseMode, Rule, RuleError, RuleKind, TrimSide};
use crate::sanitize::{normalize_extension, sanitize_filename, with_file_name};
use crate::template::{format_template, split_name_ext};
use regex::{NoExpand, RegexBuilder};
use std::path::{Path, PathBuf};

/// ルールを1件適用して新しいパスを返す。`enabled` は見ない(チェーン側で判定する)。
///
/// ディレクトリは変えず、語幹(と `change_ext` なら拡張子)だけを書き換える。
/// `new_name` はテンプレートの結果をそのまま最終ファイル名とし、元の拡張子を付け直さない。
/// メタデータのタグを展開するのは `new_name` だけで、他の種類は `{name}` `{num}` などに限る。
pub fn apply_rule(
    rule: &Rule,
    path: &Path,
    seqnum: Option<i64>,
    metadata: Option<&Metadata>,
) -> Result<PathBuf, RuleError> {
    let (stem, original_ext) = split_name_ext(path);
    let tags = |template: &str| format_template(template, path, seqnum, None);

    let stem = match &rule.kind {
        RuleKind::Replace {
            old,
            new,
            case_sensitive,
            use_tags,
        } => {
            let new = if *use_tags { tags(new) } else { new.clone() };
            replace_text(&stem, old, &new, *case_sensitive).map_err(|source| {
                RuleError::InvalidPattern {
                    rule: rule.display_name(),
                    pattern: old.clone(),
                    source,
                }
            })?
        }
        RuleKind::RegexReplace {
            pattern,
            repl,
            ignore_case,
        } => regex_replace(&stem, pattern, repl, *ignore_case).map_err(|source| {
            RuleError::InvalidPattern {
                rule: rule.display_name(),
                pattern: pattern.clone(),
                source,
            }
        })?,
        RuleKind::Insert {
            pos,
            text,
            use_tags,
        } => {
            let text = if *use_tags { tags(text) } else { text.clone() };
            insert_at(&stem, *pos, &text)
        }
        RuleKind::Remove { start, length } => remove_range(&stem, *start, *length),
        RuleKind::ChangeCase { mode } => change_case(&stem, mode),
        RuleKind::Numbering { template, .. } => tags(template),
        RuleKind::ChangeExt { .. } => stem,
        RuleKind::Trim { side, count } => trim_chars(&stem, side, *count),
        RuleKind::PrefixSuffix {
            prefix,
            suffix,
            use_tags,
        } => {
            let (prefix, suffix) = if *use_tags {
                (tags(prefix), tags(suffix))
            } else {
                (prefix.clone(), suffix.clone())
            };
            format!("{prefix}{stem}{suffix}")
        }
        RuleKind::NewName { template } => {
            let name = sanitize_filename(&format_template(template, path, seqnum, metadata));
            return Ok(with_file_name(path, &name));
        }
    };

    let extension = match &rule.kind {
        RuleKind::ChangeExt { ext } => normalize_extension(ext),
        _ => normalize_extension(&original_ext),
    };

    Ok(with_file_name(
        path,
        &sanitize_filename(&format!("{stem}{extension}")),
    ))
}

fn replace_text(
    haystack: &str,
    old: &str,
    new: &str,
    case_sensitive: bool,
) -> Result<String, regex::Error> {
    if old.is_empty() {
        return Ok(haystack.to_string());
    }
    if case_sensitive {
        return Ok(haystack.replace(old, new));
    }
    let re = RegexBuilder::new(&regex::escape(old))
        .case_insensitive(true)
        .build()?;
    Ok(re.replace_all(haystack, NoExpand(new)).into_owned())
}

fn regex_replace(
    haystack: &str,
    pattern: &str,
    repl: &str,
    ignore_case: bool,
) -> Result<String, regex::Error> {
    if pattern.is_empty() {
        return Ok(haystack.to_string());
    }
    let re = RegexBuilder::new(pattern)
        .case_insensitive(ignore_case)
        .build()?;
    Ok(re.replace_all(haystack, repl).into_owned())
}

fn insert_at(stem: &str, pos: usize, text: &str) -> String {
    let chars: Vec<char> = stem.chars().collect();
    let pos = pos.min(chars.len());
    let mut out: String = chars[..pos].iter().collect();
    out.push_str(text);
    out.extend(&chars[pos..]);
    out
}

fn remove_range(stem: &str, start: usize, length: usize) -> String {
    let chars: Vec<char> = stem.chars().collect();
    let start = start.min(chars.len());
    let end = start.saturating_add(length).min(chars.len());
    chars[..start].iter().chain(&chars[end..]).collect()
}

fn trim_chars(stem: &str, side: &TrimSide, count: usize) -> String {
    let chars: Vec<char> = stem.chars().collect();
    let len = chars.len();
    let (from, to) = match side {
        TrimSide::Left => (count.min(len), len),
        TrimSide::Right => (0, len.saturating_sub(count)),
        TrimSide::Both => (count.min(len), len.saturating_sub(count)),
        TrimSide::Other(_) => (0, len),
    };
    if from >= to {
        return String::new();
    }
    chars[from..to].iter().collect()
}

fn change_case(stem: &str, mode: &CaseMode) -> String {
    match mode {
        CaseMode::Lower => stem.to_lowercase(),
        CaseMode::Upper => stem.to_uppercase(),
        CaseMode::Title => title_case(stem),
        CaseMode::Capitalize => {
            let mut chars = stem.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.as_str().to_lowercase().chars())
                    .collect(),
                None => String::new(),
            }
        }
        CaseMode::Other(_) => stem.to_string(),
    }
}

// 英字の連なりごとに先頭だけ大文字、残りは小文字。数字や記号は区切り扱い。
fn title_case(stem: &str) -> String {
    let mut out = String::with_capacity(stem.len());
    let mut in_word = false;
    for ch in stem.chars() {
        if ch.is_alphabetic() {
            if in_word {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(ch);
            in_word = false;
        }
    }
    out
}
