//! Capability プロバイダの契約
//!
//! ディスパッチャが呼び出す外部コラボレータ（System / Vision / Media /
//! File / Speech）の狭いトレイト境界を定義する。実際の画面キャプチャや
//! キー入力などの OS プリミティブはこの境界の向こう側にあり、
//! テストではモック実装に差し替えられる。

pub mod apps;
pub mod desktop;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::Serialize;

use crate::ai::VisionAnalysis;
use crate::error::JarvisError;

/// ファイル検索のヒット種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    File,
    Folder,
}

/// ファイル検索の 1 ヒット
#[derive(Debug, Clone, Serialize)]
pub struct FileHit {
    pub path: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FileKind,
    /// ファイルのみ。フォルダは None。
    pub size: Option<u64>,
    pub parent: String,
    pub extension: Option<String>,
}

/// スクロール方向の閉集合。
/// ディスパッチャはこの型にパースできない方向を Capability 呼び出し前に拒否する。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

impl FromStr for ScrollDirection {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            _ => Err(()),
        }
    }
}

impl fmt::Display for ScrollDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Left => "left",
            Self::Right => "right",
        };
        f.write_str(s)
    }
}

/// アプリ起動・フォルダ/ファイルオープン・キー入力・コマンド実行の境界
#[async_trait]
pub trait SystemControl: Send + Sync {
    /// アプリケーションを名前と実行ファイル候補から起動する。
    async fn open_application(&self, name: &str, hints: &[String]) -> Result<bool, JarvisError>;

    /// フォルダを名前とパステンプレート候補から解決して開く。
    async fn open_folder(&self, name: &str, path_hints: &[String]) -> Result<bool, JarvisError>;

    /// ファイルまたはフォルダを既定アプリケーションで開く。
    async fn open_file(&self, path: &str) -> Result<bool, JarvisError>;

    /// テキストをキーボード入力する。
    async fn type_text(&self, text: &str, interval_ms: u64) -> Result<bool, JarvisError>;

    /// キーまたはキーコンビネーション（"ctrl+c" 等）を押す。
    async fn press_key(&self, combo: &str) -> Result<bool, JarvisError>;

    /// システムコマンドを実行する。破壊的コマンドの拒否は呼び出し側の責務。
    async fn execute_system_command(&self, command: &str) -> Result<bool, JarvisError>;

    /// Web 検索をブラウザで開く。
    async fn search_web(&self, query: &str) -> Result<bool, JarvisError>;

    /// 検出済みアプリケーション名の一覧（プロンプトコンテキスト用）
    fn installed_apps(&self) -> Vec<String>;
}

/// 画面解析・クリック・スクロールの境界
#[async_trait]
pub trait VisionControl: Send + Sync {
    /// 画面をキャプチャして LLM Vision で解析する。
    async fn analyze_screen(&self, user_query: &str) -> Result<VisionAnalysis, JarvisError>;

    /// スクリーン寸法に対するパーセンテージ座標 (0-100) でクリックする。
    async fn click_position(&self, x_percent: f64, y_percent: f64) -> Result<bool, JarvisError>;

    /// 画面をスクロールする。
    async fn scroll_screen(
        &self,
        direction: ScrollDirection,
        amount: i64,
    ) -> Result<bool, JarvisError>;
}

/// YouTube・ブラウザ操作の境界
#[async_trait]
pub trait MediaControl: Send + Sync {
    /// クエリに一致する動画を直接再生する。
    async fn play_youtube_video(&self, query: &str) -> Result<bool, JarvisError>;

    /// YouTube の検索結果を開く。
    async fn search_youtube(&self, query: &str) -> Result<bool, JarvisError>;

    /// URL をブラウザで開く。
    async fn browse_url(&self, url: &str) -> Result<bool, JarvisError>;
}

/// ファイル・フォルダ検索の境界
#[async_trait]
pub trait FileSearch: Send + Sync {
    /// クエリ（部分一致）と任意の拡張子フィルタで検索する。
    async fn search_files(
        &self,
        query: &str,
        file_type: Option<&str>,
        max_results: usize,
    ) -> Result<Vec<FileHit>, JarvisError>;
}

/// 応答テキストの読み上げ境界（fire-and-forget で呼ばれる）
#[async_trait]
pub trait SpeechOutput: Send + Sync {
    async fn speak(&self, text: &str) -> Result<(), JarvisError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scroll_direction_parses_closed_set() {
        assert_eq!("up".parse(), Ok(ScrollDirection::Up));
        assert_eq!("Down".parse(), Ok(ScrollDirection::Down));
        assert_eq!(" left ".parse(), Ok(ScrollDirection::Left));
        assert_eq!("RIGHT".parse(), Ok(ScrollDirection::Right));
        assert_eq!("sideways".parse::<ScrollDirection>(), Err(()));
        assert_eq!("".parse::<ScrollDirection>(), Err(()));
    }

    #[test]
    fn file_hit_serializes_type_field() {
        let hit = FileHit {
            path: "/home/u/doc.txt".into(),
            name: "doc.txt".into(),
            kind: FileKind::File,
            size: Some(42),
            parent: "/home/u".into(),
            extension: Some("txt".into()),
        };
        let json = serde_json::to_value(&hit).unwrap();
        assert_eq!(json["type"], "file");
        assert_eq!(json["size"], 42);
    }
}
