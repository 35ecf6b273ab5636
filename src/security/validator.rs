//! 入力サニタイズと検証
//!
//! 信頼できない自由入力が LLM プロンプトや Capability プロバイダへ届く前に
//! 通過する唯一のチョークポイント。HTML エスケープ → 危険パターン除去 →
//! 空白正規化の順で処理し、パス・URL は構造のみを検査する
//! （シンボリックリンク解決や存在確認は行わない）。

use std::path::{Component, Path};
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::error::JarvisError;

/// コマンド入力の最大長（バイト）
const MAX_COMMAND_LENGTH: usize = 10_000;

/// サニタイズで除去する危険パターン
fn dangerous_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?is)<script[^>]*>.*?</script>", // script タグ
            r"(?i)javascript:",                // JavaScript URL
            r"(?i)on\w+\s*=",                  // インラインイベントハンドラ
            r"(?i)eval\s*\(",                  // eval() 呼び出し
            r"(?i)exec\s*\(",                  // exec() 呼び出し
            r"(?i)__import__\s*\(",            // 動的 import
            r"(?i)subprocess\s*\(",            // サブプロセス起動
            r"(?i)os\.system\s*\(",            // シェル起動
        ]
        .iter()
        .map(|p| Regex::new(p).expect("invalid dangerous pattern"))
        .collect()
    })
}

/// コマンド入力で拒否する疑わしいパターン
fn suspicious_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"\.\./",             // パストラバーサル
            r"(?i)\\x[0-9a-f]{2}", // 16進エスケープ
            r"(?i)%[0-9a-f]{2}",   // パーセントエスケープ
        ]
        .iter()
        .map(|p| Regex::new(p).expect("invalid suspicious pattern"))
        .collect()
    })
}

/// `http(s)://host[:port][/path]` 文法の URL パターン
fn url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?i)^https?://(?:(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,6}\.?|localhost|\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})(?::\d+)?(?:/?|[/?]\S+)$",
        )
        .expect("invalid url pattern")
    })
}

/// `&` をエスケープする。すでにエスケープ済みのエンティティは再エスケープ
/// しない。sanitize() が冪等（固定点）であるために必要。
fn escape_ampersands(text: &str) -> String {
    const ENTITIES: [&str; 5] = ["amp;", "lt;", "gt;", "quot;", "#x27;"];

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        if ENTITIES.iter().any(|entity| after.starts_with(entity)) {
            out.push('&');
        } else {
            out.push_str("&amp;");
        }
        rest = after;
    }
    out.push_str(rest);
    out
}

/// HTML 特殊文字をエスケープする。エスケープ済みエンティティはそのまま通す。
fn html_escape(text: &str) -> String {
    escape_ampersands(text)
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

/// ユーザー入力をサニタイズする。
///
/// HTML エスケープ → 危険パターン除去 → 空白の正規化（連続空白を単一スペースに
/// 潰してトリム）。サニタイズ済みテキストに再適用しても結果は変わらない。
pub fn sanitize(text: &str) -> String {
    let mut sanitized = html_escape(text);

    for pattern in dangerous_patterns() {
        sanitized = pattern.replace_all(&sanitized, "").into_owned();
    }

    sanitized.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// コマンド入力を検証し、サニタイズ済みテキストを返す。
///
/// 空・長さ超過・疑わしいパターン（パストラバーサル、16進/パーセント
/// エスケープ）・危険パターン（script タグや eval( 等）を含む入力は拒否する。
pub fn validate_command(command: &str) -> Result<String, JarvisError> {
    if command.trim().is_empty() {
        return Err(JarvisError::validation(
            "Command cannot be empty",
            Some("command"),
        ));
    }

    if command.len() > MAX_COMMAND_LENGTH {
        return Err(JarvisError::validation("Command too long", Some("command")));
    }

    for pattern in suspicious_patterns() {
        if pattern.is_match(command) {
            debug!(pattern = %pattern.as_str(), "Command rejected by suspicious pattern");
            return Err(JarvisError::validation(
                "Command contains suspicious patterns",
                Some("command"),
            ));
        }
    }

    for pattern in dangerous_patterns() {
        if pattern.is_match(command) {
            debug!(pattern = %pattern.as_str(), "Command rejected by dangerous pattern");
            return Err(JarvisError::validation(
                "Command contains dangerous content",
                Some("command"),
            ));
        }
    }

    Ok(sanitize(command))
}

/// ファイルパスを構造的に検証する。
///
/// 空・`..` を含む・絶対パス・危険文字（`< > | " * ?`）を含むパスは拒否し、
/// それ以外は正規化した相対パスを返す。存在確認は行わない。
pub fn validate_path(path: &str) -> Result<String, JarvisError> {
    if path.is_empty() {
        return Err(JarvisError::validation(
            "File path cannot be empty",
            Some("file_path"),
        ));
    }

    if path.starts_with('/') || path.starts_with('\\') {
        return Err(JarvisError::validation("Invalid file path", Some("file_path")));
    }

    const DANGEROUS_CHARS: [char; 6] = ['<', '>', '|', '"', '*', '?'];
    if path.contains(DANGEROUS_CHARS) {
        return Err(JarvisError::validation(
            "File path contains invalid characters",
            Some("file_path"),
        ));
    }

    // `.` 成分を落として正規化。`..` やルート成分が現れたら拒否。
    let mut parts: Vec<&str> = Vec::new();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(part) => match part.to_str() {
                Some(part) => parts.push(part),
                None => {
                    return Err(JarvisError::validation(
                        "Invalid file path",
                        Some("file_path"),
                    ))
                }
            },
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(JarvisError::validation(
                    "Invalid file path",
                    Some("file_path"),
                ))
            }
        }
    }

    if parts.is_empty() {
        return Err(JarvisError::validation("Invalid file path", Some("file_path")));
    }

    Ok(parts.join("/"))
}

/// URL を検証する。`http(s)://` + ドメイン / localhost / IPv4 のみ許可。
pub fn validate_url(url: &str) -> Result<String, JarvisError> {
    if url.is_empty() {
        return Err(JarvisError::validation("URL cannot be empty", Some("url")));
    }

    if !url_pattern().is_match(url) {
        return Err(JarvisError::validation("Invalid URL format", Some("url")));
    }

    Ok(url.to_string())
}

/// カテゴリごとの許可拡張子テーブル
const ALLOWED_EXTENSIONS: [(&str, &[&str]); 7] = [
    ("images", &["jpg", "jpeg", "png", "gif", "bmp", "webp"]),
    ("documents", &["pdf", "doc", "docx", "txt", "rtf", "odt"]),
    ("spreadsheets", &["xls", "xlsx", "csv", "ods"]),
    ("presentations", &["ppt", "pptx", "odp"]),
    ("archives", &["zip", "rar", "7z", "tar", "gz"]),
    ("code", &["py", "js", "rs", "html", "css", "json", "xml", "yaml", "yml"]),
    ("media", &["mp4", "avi", "mov", "mp3", "wav", "flac"]),
];

/// 拡張子が許可テーブルに含まれるかを判定する。
/// カテゴリ指定がない場合は全カテゴリを対象にする。
#[allow(dead_code)]
pub fn validate_file_extension(path: &str, category: Option<&str>) -> bool {
    let extension = match Path::new(path).extension().and_then(|e| e.to_str()) {
        Some(ext) => ext.to_lowercase(),
        None => return false,
    };

    match category {
        Some(category) => ALLOWED_EXTENSIONS
            .iter()
            .find(|(name, _)| *name == category)
            .is_some_and(|(_, exts)| exts.contains(&extension.as_str())),
        None => ALLOWED_EXTENSIONS
            .iter()
            .any(|(_, exts)| exts.contains(&extension.as_str())),
    }
}

/// ファイル名をサニタイズする。
///
/// パス区切りを除去してベース名のみ残し、危険文字を `_` に置換、
/// 255 バイトに切り詰める。空入力は `"unnamed"` になる。
#[allow(dead_code)]
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    if base.is_empty() {
        return "unnamed".to_string();
    }

    let mut sanitized: String = base
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '|' | '?' | '*' => '_',
            c => c,
        })
        .collect();

    if sanitized.len() > 255 {
        sanitized = sanitized.chars().take(255).collect();
    }

    sanitized
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── sanitize ──

    #[test]
    fn sanitize_strips_script_tags() {
        // エスケープ後もタグ内容の痕跡が危険パターンとして残らないこと
        let out = sanitize("<script>alert('x')</script>hello");
        assert!(!out.contains("<script"));
        assert!(!out.contains("javascript:"));
        assert!(out.contains("hello"));
    }

    #[test]
    fn sanitize_strips_javascript_urls_and_handlers() {
        let out = sanitize("click javascript:void(0) onclick= go");
        assert!(!out.to_lowercase().contains("javascript:"));
        assert!(!out.to_lowercase().contains("onclick"));
    }

    #[test]
    fn sanitize_strips_eval_calls() {
        let out = sanitize("try eval(payload) now");
        assert!(!out.contains("eval("));
    }

    #[test]
    fn sanitize_collapses_whitespace() {
        assert_eq!(sanitize("  open   chrome\t\nnow  "), "open chrome now");
    }

    #[test]
    fn sanitize_is_idempotent() {
        let inputs = [
            "open chrome",
            "a < b & c > d",
            "play \"despacito\"",
            "it's 50% off <script>x</script>",
        ];
        for input in inputs {
            let once = sanitize(input);
            let twice = sanitize(&once);
            assert_eq!(once, twice, "sanitize not a fixed point for {input:?}");
        }
    }

    // ── validate_command ──

    #[test]
    fn validate_command_rejects_empty() {
        assert!(validate_command("").is_err());
        assert!(validate_command("   ").is_err());
    }

    #[test]
    fn validate_command_rejects_oversized() {
        let long = "a".repeat(MAX_COMMAND_LENGTH + 1);
        assert!(validate_command(&long).is_err());
    }

    #[test]
    fn validate_command_rejects_traversal_and_escapes() {
        assert!(validate_command("open ../etc/passwd").is_err());
        assert!(validate_command("run \\x41\\x42").is_err());
        assert!(validate_command("open %2e%2e").is_err());
    }

    #[test]
    fn validate_command_rejects_dangerous_patterns() {
        assert!(validate_command("<script>alert(1)</script>").is_err());
        assert!(validate_command("open javascript:alert(1)").is_err());
        assert!(validate_command("set onclick=pwn").is_err());
        assert!(validate_command("please eval(1+1)").is_err());
    }

    #[test]
    fn validate_command_passes_normal_input() {
        assert_eq!(validate_command("open chrome").unwrap(), "open chrome");
        assert_eq!(
            validate_command("play despacito").unwrap(),
            "play despacito"
        );
    }

    // ── validate_path ──

    #[test]
    fn validate_path_rejects_traversal() {
        assert!(validate_path("../etc/passwd").is_err());
        assert!(validate_path("docs/../../secret").is_err());
    }

    #[test]
    fn validate_path_rejects_absolute() {
        assert!(validate_path("/etc/passwd").is_err());
        assert!(validate_path("\\windows\\system32").is_err());
    }

    #[test]
    fn validate_path_rejects_dangerous_chars() {
        for path in ["a<b", "a>b", "a|b", "a\"b", "a*b", "a?b"] {
            assert!(validate_path(path).is_err(), "expected rejection: {path}");
        }
    }

    #[test]
    fn validate_path_returns_normalized_relative_unchanged() {
        assert_eq!(validate_path("docs/report.pdf").unwrap(), "docs/report.pdf");
        assert_eq!(validate_path("notes.txt").unwrap(), "notes.txt");
        // `./` は正規化で落ちる
        assert_eq!(validate_path("./docs/notes.txt").unwrap(), "docs/notes.txt");
    }

    // ── validate_url ──

    #[test]
    fn validate_url_accepts_domains_localhost_and_ips() {
        assert!(validate_url("https://www.youtube.com").is_ok());
        assert!(validate_url("http://localhost:5000/api").is_ok());
        assert!(validate_url("http://192.168.1.1/admin").is_ok());
        assert!(validate_url("https://github.com/tominaga-h?tab=repos").is_ok());
    }

    #[test]
    fn validate_url_rejects_non_http_and_garbage() {
        assert!(validate_url("").is_err());
        assert!(validate_url("ftp://example.com").is_err());
        assert!(validate_url("javascript:alert(1)").is_err());
        assert!(validate_url("not a url").is_err());
        assert!(validate_url("https://").is_err());
    }

    // ── extensions / filenames ──

    #[test]
    fn file_extension_allow_table() {
        assert!(validate_file_extension("report.pdf", Some("documents")));
        assert!(!validate_file_extension("report.pdf", Some("images")));
        assert!(validate_file_extension("photo.PNG", None));
        assert!(!validate_file_extension("malware.scr", None));
        assert!(!validate_file_extension("no_extension", None));
    }

    #[test]
    fn sanitize_filename_strips_paths_and_chars() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("a<b>c.txt"), "a_b_c.txt");
        assert_eq!(sanitize_filename(""), "unnamed");
        assert_eq!(sanitize_filename("dir\\file.txt"), "file.txt");
    }
}
