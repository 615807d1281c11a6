use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub const DEFAULT_NUMBERING_TEMPLATE: &str = "{name}_{num:3}";
pub const DEFAULT_NEW_NAME_TEMPLATE: &str = "{Csv:1}";

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("未対応のルール種別です: {0}")]
    UnknownKind(String),
    #[error("正規表現が不正です ({rule}): {pattern}")]
    InvalidPattern {
        rule: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaseMode {
    Lower,
    Upper,
    Title,
    Capitalize,
    /// 未知のモード。適用しても語幹は変わらない。
    Other(String),
}

impl CaseMode {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "lower" => CaseMode::Lower,
            "upper" => CaseMode::Upper,
            "title" => CaseMode::Title,
            "capitalize" => CaseMode::Capitalize,
            _ => CaseMode::Other(raw.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            CaseMode::Lower => "lower",
            CaseMode::Upper => "upper",
            CaseMode::Title => "title",
            CaseMode::Capitalize => "capitalize",
            CaseMode::Other(raw) => raw,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrimSide {
    Left,
    Right,
    Both,
    Other(String),
}

impl TrimSide {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "left" => TrimSide::Left,
            "right" => TrimSide::Right,
            "both" => TrimSide::Both,
            _ => TrimSide::Other(raw.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TrimSide::Left => "left",
            TrimSide::Right => "right",
            TrimSide::Both => "both",
            TrimSide::Other(raw) => raw,
        }
    }
}

/// ルール種別とそのパラメータ。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleKind {
    Replace {
        old: String,
        new: String,
        case_sensitive: bool,
        use_tags: bool,
    },
    RegexReplace {
        pattern: String,
        repl: String,
        ignore_case: bool,
    },
    Insert {
        pos: usize,
        text: String,
        use_tags: bool,
    },
    Remove {
        start: usize,
        length: usize,
    },
    ChangeCase {
        mode: CaseMode,
    },
    /// `start` / `increment` は連番の算出にだけ使う。
    Numbering {
        template: String,
        start: i64,
        increment: i64,
    },
    ChangeExt {
        ext: String,
    },
    Trim {
        side: TrimSide,
        count: usize,
    },
    PrefixSuffix {
        prefix: String,
        suffix: String,
        use_tags: bool,
    },
    /// 拡張子を含む最終ファイル名をテンプレートから作る。
    NewName {
        template: String,
    },
}

impl RuleKind {
    /// 種別名は大文字小文字を区別しない。`custom_template` は `new_name` の別名。
    pub fn from_params(kind: &str, params: &Map<String, Value>) -> Result<Self, RuleError> {
        let kind = match kind.trim().to_ascii_lowercase().as_str() {
            "replace" => RuleKind::Replace {
                old: str_param(params, "old", ""),
                new: str_param(params, "new", ""),
                case_sensitive: bool_param(params, "case_sensitive", true),
                use_tags: bool_param(params, "use_tags", false),
            },
            "regex_replace" => RuleKind::RegexReplace {
                pattern: str_param(params, "pattern", ""),
                repl: str_param(params, "repl", ""),
                ignore_case: bool_param(params, "ignore_case", false),
            },
            "insert" => RuleKind::Insert {
                pos: count_param(params, "pos", 0),
                text: str_param(params, "text", ""),
                use_tags: bool_param(params, "use_tags", false),
            },
            "remove" => RuleKind::Remove {
                start: count_param(params, "start", 0),
                length: count_param(params, "length", 1),
            },
            "change_case" => RuleKind::ChangeCase {
                mode: CaseMode::parse(&str_param(params, "mode", "lower")),
            },
            "numbering" => RuleKind::Numbering {
                template: str_param(params, "template", DEFAULT_NUMBERING_TEMPLATE),
                start: int_param(params, "start", 1),
                increment: int_param(params, "increment", 1),
            },
            "change_ext" => RuleKind::ChangeExt {
                ext: str_param(params, "ext", ""),
            },
            "trim" => RuleKind::Trim {
                side: TrimSide::parse(&str_param(params, "side", "both")),
                count: count_param(params, "count", 1),
            },
            "prefix_suffix" => RuleKind::PrefixSuffix {
                prefix: str_param(params, "prefix", ""),
                suffix: str_param(params, "suffix", ""),
                use_tags: bool_param(params, "use_tags", false),
            },
            "new_name" | "custom_template" => RuleKind::NewName {
                template: str_param(params, "template", DEFAULT_NEW_NAME_TEMPLATE),
            },
            other => return Err(RuleError::UnknownKind(other.to_string())),
        };
        Ok(kind)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            RuleKind::Replace { .. } => "replace",
            RuleKind::RegexReplace { .. } => "regex_replace",
            RuleKind::Insert { .. } => "insert",
            RuleKind::Remove { .. } => "remove",
            RuleKind::ChangeCase { .. } => "change_case",
            RuleKind::Numbering { .. } => "numbering",
            RuleKind::ChangeExt { .. } => "change_ext",
            RuleKind::Trim { .. } => "trim",
            RuleKind::PrefixSuffix { .. } => "prefix_suffix",
            RuleKind::NewName { .. } => "new_name",
        }
    }

    pub fn params(&self) -> Map<String, Value> {
        let mut map = Map::new();
        let mut put = |key: &str, value: Value| {
            map.insert(key.to_string(), value);
        };
        match self {
            RuleKind::Replace {
                old,
                new,
                case_sensitive,
                use_tags,
            } => {
                put("old", Value::from(old.as_str()));
                put("new", Value::from(new.as_str()));
                put("case_sensitive", Value::from(*case_sensitive));
                put("use_tags", Value::from(*use_tags));
            }
            RuleKind::RegexReplace {
                pattern,
                repl,
                ignore_case,
            } => {
                put("pattern", Value::from(pattern.as_str()));
                put("repl", Value::from(repl.as_str()));
                put("ignore_case", Value::from(*ignore_case));
            }
            RuleKind::Insert {
                pos,
                text,
                use_tags,
            } => {
                put("pos", Value::from(*pos));
                put("text", Value::from(text.as_str()));
                put("use_tags", Value::from(*use_tags));
            }
            RuleKind::Remove { start, length } => {
                put("start", Value::from(*start));
                put("length", Value::from(*length));
            }
            RuleKind::ChangeCase { mode } => put("mode", Value::from(mode.as_str())),
            RuleKind::Numbering {
                template,
                start,
                increment,
            } => {
                put("template", Value::from(template.as_str()));
                put("start", Value::from(*start));
                put("increment", Value::from(*increment));
            }
            RuleKind::ChangeExt { ext } => put("ext", Value::from(ext.as_str())),
            RuleKind::Trim { side, count } => {
                put("side", Value::from(side.as_str()));
                put("count", Value::from(*count));
            }
            RuleKind::PrefixSuffix {
                prefix,
                suffix,
                use_tags,
            } => {
                put("prefix", Value::from(prefix.as_str()));
                put("suffix", Value::from(suffix.as_str()));
                put("use_tags", Value::from(*use_tags));
            }
            RuleKind::NewName { template } => put("template", Value::from(template.as_str())),
        }
        map
    }
}

/// リネームルール1件。無効化されたルールはリストに残したまま評価だけ飛ばす。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRule", into = "RawRule")]
pub struct Rule {
    pub kind: RuleKind,
    pub enabled: bool,
    /// 利用者が付けた表示名。空なら種別とパラメータから作る。
    pub name: String,
}

impl Rule {
    pub fn new(kind: RuleKind) -> Self {
        Self {
            kind,
            enabled: true,
            name: String::new(),
        }
    }

    pub fn from_params(kind: &str, params: &Map<String, Value>) -> Result<Self, RuleError> {
        RuleKind::from_params(kind, params).map(Self::new)
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn display_name(&self) -> String {
        if !self.name.is_empty() {
            return self.name.clone();
        }
        format!(
            "{} {}",
            self.kind.type_name(),
            Value::Object(self.kind.params())
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawRule {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default = "default_enabled")]
    enabled: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    name: String,
    #[serde(default)]
    params: Map<String, Value>,
}

fn default_enabled() -> bool {
    true
}

impl TryFrom<RawRule> for Rule {
    type Error = RuleError;

    fn try_from(raw: RawRule) -> Result<Self, Self::Error> {
        Ok(Rule {
            kind: RuleKind::from_params(&raw.kind, &raw.params)?,
            enabled: raw.enabled,
            name: raw.name,
        })
    }
}

impl From<Rule> for RawRule {
    fn from(rule: Rule) -> Self {
        RawRule {
            kind: rule.kind.type_name().to_string(),
            enabled: rule.enabled,
            name: rule.name,
            params: rule.kind.params(),
        }
    }
}

fn str_param(params: &Map<String, Value>, key: &str, default: &str) -> String {
    match params.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => default.to_string(),
    }
}

fn bool_param(params: &Map<String, Value>, key: &str, default: bool) -> bool {
    match params.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64().map(|v| v != 0).unwrap_or(default),
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => true,
            "false" | "0" | "no" | "off" => false,
            _ => default,
        },
        _ => default,
    }
}

fn int_param(params: &Map<String, Value>, key: &str, default: i64) -> i64 {
    match params.get(key) {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(default),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(default),
        _ => default,
    }
}

fn count_param(params: &Map<String, Value>, key: &str, default: usize) -> usize {
    let fallback = i64::try_from(default).unwrap_or(i64::MAX);
    usize::try_from(int_param(params, key, fallback)).unwrap_or(0)
}
