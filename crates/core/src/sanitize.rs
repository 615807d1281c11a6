use std::path::{Path, PathBuf};

const UNTITLED: &str = "untitled";

/// ファイル名に使えない文字を `_` に置き換える。置換後の文字は対象外なので何度かけても結果は同じ。
pub fn sanitize_filename(value: &str) -> String {
    value
        .chars()
        .map(|ch| if is_disallowed_char(ch) { '_' } else { ch })
        .collect()
}

/// ディレクトリ部分はそのままにファイル名だけ差し替える。
pub fn with_file_name(path: &Path, file_name: &str) -> PathBuf {
    if file_name.is_empty() || file_name == "." || file_name == ".." {
        return path.with_file_name(UNTITLED);
    }
    path.with_file_name(file_name)
}

/// 先頭のドットを補う。空なら拡張子なし。
pub fn normalize_extension(ext: &str) -> String {
    if ext.is_empty() || ext.starts_with('.') {
        ext.to_string()
    } else {
        format!(".{ext}")
    }
}

fn is_disallowed_char(ch: char) -> bool {
    matches!(ch, '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|') || ch.is_control()
}
