//! インストール済みアプリケーションのインデックス
//!
//! 起動時に PATH 内の実行可能コマンド名を `HashSet` にキャッシュし、
//! プロンプトへ埋め込む「検出済みアプリ」コンテキストと、
//! アプリ起動時の候補解決に使用する。
//! `RwLock` による内部可変性を持ち、環境が変わった際にリロードできる。

use std::collections::HashSet;
use std::env;
use std::fs;
use std::sync::RwLock;

use tracing::{info, warn};

/// PATH 走査ベースのアプリケーションインデックス
pub struct AppIndex {
    names: RwLock<HashSet<String>>,
}

impl AppIndex {
    /// PATH 環境変数を走査してインデックスを初期化する。
    pub fn new() -> Self {
        let names = Self::build_path_cache();
        info!(indexed_apps = names.len(), "AppIndex initialized with PATH cache");
        Self {
            names: RwLock::new(names),
        }
    }

    /// 指定した名前がインデックスに存在するか（大文字小文字は区別しない）。
    pub fn contains(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        self.names
            .read()
            .unwrap()
            .iter()
            .any(|n| n.to_lowercase() == lower)
    }

    /// 検出済みアプリ名をソートして最大 `cap` 件返す。
    pub fn detected(&self, cap: usize) -> Vec<String> {
        let names = self.names.read().unwrap();
        let mut sorted: Vec<String> = names.iter().cloned().collect();
        sorted.sort();
        sorted.truncate(cap);
        sorted
    }

    /// PATH 環境変数を走査し、実行可能ファイル名を HashSet に格納する。
    fn build_path_cache() -> HashSet<String> {
        let mut names = HashSet::new();

        let path_var = match env::var("PATH") {
            Ok(p) => p,
            Err(_) => {
                warn!("PATH environment variable not set, app index will be empty");
                return names;
            }
        };

        for dir in env::split_paths(&path_var) {
            let entries = match fs::read_dir(&dir) {
                Ok(e) => e,
                Err(_) => continue, // 読めないディレクトリはスキップ
            };

            for entry in entries.flatten() {
                if let Some(name) = entry.file_name().to_str() {
                    // NOTE: fs::metadata はシンボリックリンクを辿る
                    // （entry.metadata は辿らない）
                    if let Ok(metadata) = fs::metadata(entry.path()) {
                        if metadata.is_file() {
                            names.insert(name.to_string());
                        }
                    }
                }
            }
        }

        names
    }
}

impl Default for AppIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detected_is_sorted_and_capped() {
        let index = AppIndex {
            names: RwLock::new(
                ["zsh", "bash", "cargo", "vim"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            ),
        };

        let detected = index.detected(3);
        assert_eq!(detected, vec!["bash", "cargo", "vim"]);
    }

    #[test]
    fn contains_is_case_insensitive() {
        let index = AppIndex {
            names: RwLock::new(["Firefox"].iter().map(|s| s.to_string()).collect()),
        };
        assert!(index.contains("firefox"));
        assert!(index.contains("FIREFOX"));
        assert!(!index.contains("chrome"));
    }

    #[test]
    fn path_scan_finds_common_binaries() {
        // PATH のあるシステムでは何かしら見つかるはず
        let index = AppIndex::new();
        let detected = index.detected(usize::MAX);
        if env::var("PATH").is_ok() {
            assert!(!detected.is_empty());
        }
    }
}
