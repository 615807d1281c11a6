use crate::metadata::Metadata;
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local};
use regex::{Captures, Regex};
use std::fmt::Write;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

/// ゼロ埋め幅の上限。ファイル名の長さ制限を超える幅は意味がない。
const MAX_PAD_WIDTH: usize = 255;

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^{}]+)\}").expect("valid placeholder regex"));

/// テンプレート展開時に参照する値。
#[derive(Debug, Clone, Copy)]
pub struct TagContext<'a> {
    pub path: &'a Path,
    pub seqnum: Option<i64>,
    pub metadata: Option<&'a Metadata>,
}

type Expander = fn(&str, &TagContext<'_>) -> Option<String>;

/// プレースホルダの解決順。前の段で解決したものは後段に渡らない。
///
/// 1. `{name}` / `{ext}`
/// 2. `{date:FMT}`
/// 3. `{num}` / `{num:W}`
/// 4. `{<key>}` / `{<key>:W}` (メタデータ。`Csv:` キーもここで引ける)
/// 5. `{Csv:<col>}` の残り (該当なしは空文字)
///
/// テンプレートは一度だけ走査するため、展開後の値が別のプレースホルダとして
/// 再解釈されることはない。どの段にも当たらないものは原文のまま残す。
const PASSES: &[(&str, Expander)] = &[
    ("name_ext", expand_name_ext),
    ("date", expand_date),
    ("num", expand_num),
    ("metadata", expand_metadata),
    ("csv", expand_csv),
];

pub fn format_template(
    template: &str,
    path: &Path,
    seqnum: Option<i64>,
    metadata: Option<&Metadata>,
) -> String {
    let ctx = TagContext {
        path,
        seqnum,
        metadata,
    };
    render_with_context(template, &ctx)
}

fn render_with_context(template: &str, ctx: &TagContext<'_>) -> String {
    PLACEHOLDER_RE
        .replace_all(template, |caps: &Captures<'_>| {
            let body = &caps[1];
            PASSES
                .iter()
                .find_map(|(_, expand)| expand(body, ctx))
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// 最後の `.` で語幹と拡張子(ドットなし)に分ける。先頭ドットのみ・末尾ドットは拡張子扱いしない。
pub fn split_name_ext(path: &Path) -> (String, String) {
    let name = path
        .file_name()
        .map(|v| v.to_string_lossy().to_string())
        .unwrap_or_default();
    match name.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < name.len() => {
            (name[..idx].to_string(), name[idx + 1..].to_string())
        }
        _ => (name, String::new()),
    }
}

/// 符号を保ったまま左をゼロで埋める。
pub fn zero_pad(value: &str, width: usize) -> String {
    let width = width.min(MAX_PAD_WIDTH);
    let len = value.chars().count();
    if len >= width {
        return value.to_string();
    }

    let (sign, digits) = match value.chars().next() {
        Some(c @ ('+' | '-')) => (Some(c), &value[1..]),
        _ => (None, value),
    };
    let mut out = String::with_capacity(width);
    if let Some(sign) = sign {
        out.push(sign);
    }
    out.extend(std::iter::repeat('0').take(width - len));
    out.push_str(digits);
    out
}

fn expand_name_ext(body: &str, ctx: &TagContext<'_>) -> Option<String> {
    match body {
        "name" => Some(split_name_ext(ctx.path).0),
        "ext" => Some(split_name_ext(ctx.path).1),
        _ => None,
    }
}

fn expand_date(body: &str, ctx: &TagContext<'_>) -> Option<String> {
    let fmt = body.strip_prefix("date:").filter(|f| !f.is_empty())?;
    let stamp = file_modified(ctx.path).unwrap_or_else(Local::now);
    Some(format_timestamp(&stamp, fmt))
}

fn expand_num(body: &str, ctx: &TagContext<'_>) -> Option<String> {
    let width = match body.strip_prefix("num") {
        Some("") => None,
        Some(rest) => Some(parse_width(rest.strip_prefix(':')?)?),
        None => return None,
    };
    Some(match (ctx.seqnum, width) {
        (Some(n), Some(width)) => zero_pad(&n.to_string(), width),
        (Some(n), None) => n.to_string(),
        (None, _) => String::new(),
    })
}

fn expand_metadata(body: &str, ctx: &TagContext<'_>) -> Option<String> {
    let metadata = ctx.metadata?;
    if let Some(value) = metadata.get(body) {
        return Some(value.to_string());
    }
    let (key, width) = body.rsplit_once(':')?;
    let width = parse_width(width)?;
    metadata
        .get(key)
        .map(|value| zero_pad(&value.to_string(), width))
}

fn expand_csv(body: &str, ctx: &TagContext<'_>) -> Option<String> {
    body.strip_prefix("Csv:")?;
    Some(
        ctx.metadata
            .and_then(|m| m.get(body))
            .map(ToString::to_string)
            .unwrap_or_default(),
    )
}

fn parse_width(raw: &str) -> Option<usize> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse::<usize>().ok()
}

fn format_timestamp(stamp: &DateTime<Local>, fmt: &str) -> String {
    let items: Vec<Item<'_>> = StrftimeItems::new(fmt).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return String::new();
    }
    let mut out = String::new();
    if write!(out, "{}", stamp.format_with_items(items.iter())).is_err() {
        return String::new();
    }
    out
}

fn file_modified(path: &Path) -> Option<DateTime<Local>> {
    let time = fs::metadata(path).ok()?.modified().ok()?;
    Some(DateTime::from(time))
}
