//! デスクトップ向けの既定 Capability 実装
//!
//! プロセス起動ベースのランチャ、プラットフォームオープナ経由の
//! フォルダ/ファイル/URL オープン、walkdir によるファイル検索を提供する。
//! 画面キャプチャ・キー入力などの入力プリミティブは外部コラボレータのため、
//! ここでは構造化エラーを返す実装のみを置く。

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::ai::VisionAnalysis;
use crate::config::SearchConfig;
use crate::error::JarvisError;
use crate::security::validator;

use super::apps::AppIndex;
use super::{
    FileHit, FileKind, FileSearch, MediaControl, ScrollDirection, SpeechOutput, SystemControl,
};

/// ホーム直下の既知フォルダ（小文字名 → ディレクトリ名）
const KNOWN_FOLDERS: [(&str, &str); 6] = [
    ("downloads", "Downloads"),
    ("documents", "Documents"),
    ("desktop", "Desktop"),
    ("pictures", "Pictures"),
    ("music", "Music"),
    ("videos", "Videos"),
];

/// `$VAR` / `${VAR}` 形式の環境変数参照
fn env_var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{?([A-Za-z_][A-Za-z0-9_]*)\}?").expect("invalid env var pattern")
    })
}

/// ホームディレクトリを返す。
fn home_dir() -> Option<PathBuf> {
    directories::UserDirs::new().map(|dirs| dirs.home_dir().to_path_buf())
}

/// パステンプレートの `~` と環境変数を展開する。
fn expand_path(template: &str) -> String {
    let expanded = if let Some(rest) = template.strip_prefix("~") {
        match home_dir() {
            Some(home) => format!("{}{}", home.display(), rest),
            None => template.to_string(),
        }
    } else {
        template.to_string()
    };

    env_var_pattern()
        .replace_all(&expanded, |caps: &regex::Captures<'_>| {
            std::env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned()
}

/// パスまたは URL をプラットフォームの既定アプリケーションで開く。
fn open_with_default(target: &str) -> std::io::Result<()> {
    let mut command = match std::env::consts::OS {
        "macos" => {
            let mut c = Command::new("open");
            c.arg(target);
            c
        }
        "windows" => {
            let mut c = Command::new("cmd");
            c.args(["/C", "start", "", target]);
            c
        }
        _ => {
            let mut c = Command::new("xdg-open");
            c.arg(target);
            c
        }
    };

    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map(|_| ())
}

/// プロセス起動ベースの System プロバイダ
pub struct DesktopSystem {
    apps: Arc<AppIndex>,
    files: Arc<dyn FileSearch>,
}

impl DesktopSystem {
    pub fn new(apps: Arc<AppIndex>, files: Arc<dyn FileSearch>) -> Self {
        Self { apps, files }
    }

    /// 単一の候補名での起動を試みる。
    fn launch_candidate(candidate: &str) -> bool {
        if std::env::consts::OS == "macos" {
            // macOS はアプリバンドル名でも起動できる
            if let Ok(status) = Command::new("open")
                .args(["-a", candidate])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
            {
                if status.success() {
                    return true;
                }
            }
        }

        match which::which(candidate) {
            Ok(path) => Command::new(path)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()
                .is_ok(),
            Err(_) => false,
        }
    }

    /// 既知フォルダ名をホーム直下の実パスに解決する。
    fn known_folder_path(name: &str) -> Option<PathBuf> {
        let lower = name.to_lowercase();
        let dir_name = KNOWN_FOLDERS
            .iter()
            .find(|(key, _)| *key == lower)
            .map(|(_, dir)| *dir)?;
        Some(home_dir()?.join(dir_name))
    }
}

#[async_trait]
impl SystemControl for DesktopSystem {
    async fn open_application(&self, name: &str, hints: &[String]) -> Result<bool, JarvisError> {
        info!(app = %name, hints = hints.len(), "Opening application");

        if !self.apps.contains(name) {
            debug!(app = %name, "App not in PATH index, relying on hints and launcher");
        }

        let candidates = std::iter::once(name.to_string()).chain(hints.iter().cloned());
        for candidate in candidates {
            if Self::launch_candidate(&candidate) {
                info!(app = %name, via = %candidate, "Application launched");
                return Ok(true);
            }
        }

        warn!(app = %name, "Could not find or open application");
        Ok(false)
    }

    async fn open_folder(&self, name: &str, path_hints: &[String]) -> Result<bool, JarvisError> {
        info!(folder = %name, "Opening folder");

        // 1. 既知フォルダ名
        if let Some(path) = Self::known_folder_path(name) {
            if path.exists() {
                open_with_default(&path.to_string_lossy())
                    .map_err(|e| JarvisError::system(e.to_string(), "open_folder", name))?;
                info!(path = %path.display(), "Opened known folder");
                return Ok(true);
            }
        }

        // 2. 呼び出し元が与えたパステンプレート
        for template in path_hints {
            let expanded = expand_path(template);
            if Path::new(&expanded).exists() {
                open_with_default(&expanded)
                    .map_err(|e| JarvisError::system(e.to_string(), "open_folder", name))?;
                info!(path = %expanded, "Opened folder from path hints");
                return Ok(true);
            }
        }

        // 3. ファイル検索にフォールバック
        let hits = self.files.search_files(name, None, 10).await?;
        if let Some(folder) = hits.iter().find(|hit| hit.kind == FileKind::Folder) {
            open_with_default(&folder.path)
                .map_err(|e| JarvisError::system(e.to_string(), "open_folder", name))?;
            info!(path = %folder.path, "Found and opened folder via search");
            return Ok(true);
        }

        // 4. 直接パスとして解釈（構造検証を通る相対パスのみ）
        if let Ok(normalized) = validator::validate_path(name) {
            if Path::new(&normalized).exists() {
                open_with_default(&normalized)
                    .map_err(|e| JarvisError::system(e.to_string(), "open_folder", name))?;
                info!(path = %normalized, "Opened direct folder path");
                return Ok(true);
            }
        }

        Ok(false)
    }

    async fn open_file(&self, path: &str) -> Result<bool, JarvisError> {
        if !Path::new(path).exists() {
            return Err(JarvisError::system(
                format!("Path does not exist: {path}"),
                "open_file",
                path,
            ));
        }

        open_with_default(path)
            .map_err(|e| JarvisError::system(e.to_string(), "open_file", path))?;
        info!(path = %path, "Opened file");
        Ok(true)
    }

    async fn type_text(&self, text: &str, _interval_ms: u64) -> Result<bool, JarvisError> {
        // キーボード入力プリミティブは外部コラボレータ。このビルドには含まれない。
        let preview: String = text.chars().take(50).collect();
        warn!(text = %preview, "Keyboard injection backend not available");
        Err(JarvisError::system(
            "Keyboard input backend is not available in this build",
            "type_text",
            &preview,
        ))
    }

    async fn press_key(&self, combo: &str) -> Result<bool, JarvisError> {
        warn!(key = %combo, "Keyboard injection backend not available");
        Err(JarvisError::system(
            "Keyboard input backend is not available in this build",
            "press_key",
            combo,
        ))
    }

    async fn execute_system_command(&self, command: &str) -> Result<bool, JarvisError> {
        info!(command = %command, "Executing system command");

        let mut shell = if std::env::consts::OS == "windows" {
            let mut c = tokio::process::Command::new("cmd");
            c.args(["/C", command]);
            c
        } else {
            let mut c = tokio::process::Command::new("sh");
            c.args(["-c", command]);
            c
        };

        let status = shell
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|e| JarvisError::system(e.to_string(), "system_command", command))?;

        Ok(status.success())
    }

    async fn search_web(&self, query: &str) -> Result<bool, JarvisError> {
        let url = format!(
            "https://www.google.com/search?q={}",
            urlencoding::encode(query)
        );
        open_with_default(&url)
            .map_err(|e| JarvisError::system(e.to_string(), "search_web", query))?;
        info!(query = %query, "Performed web search");
        Ok(true)
    }

    fn installed_apps(&self) -> Vec<String> {
        self.apps.detected(200)
    }
}

/// ブラウザ経由の Media プロバイダ
///
/// 直接再生は外部のメディアリゾルバが必要なため、このビルドでは
/// 構造化エラーを返す（ディスパッチャが検索フォールバックへ落とす）。
pub struct DesktopMedia;

#[async_trait]
impl MediaControl for DesktopMedia {
    async fn play_youtube_video(&self, query: &str) -> Result<bool, JarvisError> {
        warn!(query = %query, "Direct video resolver not available");
        Err(JarvisError::application(
            "Direct video resolver is not available in this build",
            query,
        ))
    }

    async fn search_youtube(&self, query: &str) -> Result<bool, JarvisError> {
        let url = format!(
            "https://www.youtube.com/results?search_query={}",
            urlencoding::encode(query)
        );
        open_with_default(&url)
            .map_err(|e| JarvisError::system(e.to_string(), "search_youtube", query))?;
        info!(query = %query, "Searched YouTube");
        Ok(true)
    }

    async fn browse_url(&self, url: &str) -> Result<bool, JarvisError> {
        open_with_default(url)
            .map_err(|e| JarvisError::system(e.to_string(), "browse_url", url))?;
        info!(url = %url, "Opened URL in browser");
        Ok(true)
    }
}

/// walkdir ベースの File 検索プロバイダ
pub struct DesktopFiles {
    roots: Vec<PathBuf>,
}

impl DesktopFiles {
    /// 設定から検索ルートを構築する。設定が空ならホーム配下の
    /// 標準フォルダ（存在するもののみ）を使用する。
    pub fn new(search: &SearchConfig) -> Self {
        let mut roots: Vec<PathBuf> = if search.locations.is_empty() {
            Self::default_roots()
        } else {
            search
                .locations
                .iter()
                .map(|loc| PathBuf::from(expand_path(loc)))
                .collect()
        };

        roots.retain(|root| root.exists());
        info!(roots = roots.len(), "File search roots configured");
        Self { roots }
    }

    fn default_roots() -> Vec<PathBuf> {
        let Some(home) = home_dir() else {
            return Vec::new();
        };
        let mut roots = vec![home.clone()];
        for sub in ["Desktop", "Documents", "Downloads", "Pictures"] {
            roots.push(home.join(sub));
        }
        roots
    }
}

/// 検索ルートを走査してヒットを収集する（ブロッキング処理）。
fn scan_roots(
    roots: &[PathBuf],
    query: &str,
    file_type: Option<&str>,
    max_results: usize,
) -> Vec<FileHit> {
    let query_lower = query.to_lowercase();
    let type_lower = file_type.map(str::to_lowercase);
    let mut results: Vec<FileHit> = Vec::new();

    'outer: for root in roots {
        debug!(root = %root.display(), "Scanning location");

        for entry in WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_map(Result::ok)
        {
            if results.len() >= max_results {
                break 'outer;
            }

            let name = entry.file_name().to_string_lossy();
            if !name.to_lowercase().contains(&query_lower) {
                continue;
            }

            let path = entry.path();
            let extension = path
                .extension()
                .map(|ext| ext.to_string_lossy().to_lowercase());

            if let Some(ref wanted) = type_lower {
                if extension.as_deref() != Some(wanted.as_str()) {
                    continue;
                }
            }

            let kind = if entry.file_type().is_dir() {
                FileKind::Folder
            } else {
                FileKind::File
            };

            // 拡張子フィルタ指定時はフォルダを除外する
            if type_lower.is_some() && kind == FileKind::Folder {
                continue;
            }

            let size = match kind {
                FileKind::File => entry.metadata().ok().map(|m| m.len()),
                FileKind::Folder => None,
            };

            results.push(FileHit {
                path: path.to_string_lossy().into_owned(),
                name: name.into_owned(),
                kind,
                size,
                parent: path
                    .parent()
                    .map(|p| p.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                extension: match kind {
                    FileKind::File => extension,
                    FileKind::Folder => None,
                },
            });
        }
    }

    // フォルダ優先、次に名前順
    results.sort_by(|a, b| {
        let a_key = (a.kind != FileKind::Folder, a.name.to_lowercase());
        let b_key = (b.kind != FileKind::Folder, b.name.to_lowercase());
        a_key.cmp(&b_key)
    });

    results
}

#[async_trait]
impl FileSearch for DesktopFiles {
    async fn search_files(
        &self,
        query: &str,
        file_type: Option<&str>,
        max_results: usize,
    ) -> Result<Vec<FileHit>, JarvisError> {
        info!(query = %query, file_type = ?file_type, "Searching for files");

        let roots = self.roots.clone();
        let query = query.to_string();
        let file_type = file_type.map(str::to_string);

        let results = tokio::task::spawn_blocking(move || {
            scan_roots(&roots, &query, file_type.as_deref(), max_results)
        })
        .await
        .map_err(|e| JarvisError::system(e.to_string(), "search_files", "scan"))?;

        info!(count = results.len(), "File search completed");
        Ok(results)
    }
}

/// 画面バックエンドを持たない Vision プロバイダ。
/// すべての操作が構造化 VisionError になる。
pub struct UnsupportedVision;

#[async_trait]
impl super::VisionControl for UnsupportedVision {
    async fn analyze_screen(&self, _user_query: &str) -> Result<VisionAnalysis, JarvisError> {
        Err(JarvisError::vision(
            "Screen capture backend is not available in this build",
            "analyze",
        ))
    }

    async fn click_position(&self, _x: f64, _y: f64) -> Result<bool, JarvisError> {
        Err(JarvisError::vision(
            "Screen interaction backend is not available in this build",
            "click",
        ))
    }

    async fn scroll_screen(
        &self,
        _direction: ScrollDirection,
        _amount: i64,
    ) -> Result<bool, JarvisError> {
        Err(JarvisError::vision(
            "Screen interaction backend is not available in this build",
            "scroll",
        ))
    }
}

/// 読み上げエンジンを持たない Speech プロバイダ。ログだけ残して成功する。
pub struct NullSpeech;

#[async_trait]
impl SpeechOutput for NullSpeech {
    async fn speak(&self, text: &str) -> Result<(), JarvisError> {
        let preview: String = text.chars().take(80).collect();
        debug!(text = %preview, "Speech requested but no TTS engine is wired");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    #[test]
    #[serial]
    fn expand_path_resolves_tilde_and_env_vars() {
        std::env::set_var("JARVISD_TEST_DIR", "/tmp/jarvisd");

        assert_eq!(expand_path("$JARVISD_TEST_DIR/docs"), "/tmp/jarvisd/docs");
        assert_eq!(expand_path("${JARVISD_TEST_DIR}/docs"), "/tmp/jarvisd/docs");

        let expanded = expand_path("~/Documents");
        assert!(!expanded.starts_with('~'));
        assert!(expanded.ends_with("/Documents"));

        std::env::remove_var("JARVISD_TEST_DIR");
    }

    #[test]
    #[serial]
    fn expand_path_replaces_missing_vars_with_empty() {
        std::env::remove_var("JARVISD_NO_SUCH_VAR");
        assert_eq!(expand_path("$JARVISD_NO_SUCH_VAR/x"), "/x");
    }

    #[test]
    fn known_folder_names_resolve_under_home() {
        let path = DesktopSystem::known_folder_path("Downloads").unwrap();
        assert!(path.ends_with("Downloads"));
        assert!(DesktopSystem::known_folder_path("nonexistent").is_none());
    }

    fn fixture_tree() -> tempfile::TempDir {
        let tmp = tempfile::TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("report_folder")).unwrap();
        fs::write(tmp.path().join("report.pdf"), b"pdf").unwrap();
        fs::write(tmp.path().join("report_old.txt"), b"txt").unwrap();
        fs::write(tmp.path().join("unrelated.md"), b"md").unwrap();
        tmp
    }

    #[test]
    fn scan_matches_substring_case_insensitive() {
        let tmp = fixture_tree();
        let hits = scan_roots(&[tmp.path().to_path_buf()], "REPORT", None, 50);

        let names: Vec<&str> = hits.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["report_folder", "report.pdf", "report_old.txt"]);
    }

    #[test]
    fn scan_folders_sort_first() {
        let tmp = fixture_tree();
        let hits = scan_roots(&[tmp.path().to_path_buf()], "report", None, 50);
        assert_eq!(hits[0].kind, FileKind::Folder);
        assert!(hits[0].size.is_none());
    }

    #[test]
    fn scan_applies_extension_filter() {
        let tmp = fixture_tree();
        let hits = scan_roots(&[tmp.path().to_path_buf()], "report", Some("pdf"), 50);

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "report.pdf");
        assert_eq!(hits[0].extension.as_deref(), Some("pdf"));
        assert_eq!(hits[0].kind, FileKind::File);
    }

    #[test]
    fn scan_caps_results() {
        let tmp = tempfile::TempDir::new().unwrap();
        for i in 0..10 {
            fs::write(tmp.path().join(format!("note{i}.txt")), b"x").unwrap();
        }
        let hits = scan_roots(&[tmp.path().to_path_buf()], "note", None, 3);
        assert_eq!(hits.len(), 3);
    }

    #[tokio::test]
    async fn unsupported_vision_returns_structured_errors() {
        use super::super::VisionControl;

        let vision = UnsupportedVision;
        let err = vision.analyze_screen("find the button").await.unwrap_err();
        assert_eq!(err.error_code(), "VISION_ERROR");
    }
}
