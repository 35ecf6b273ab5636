//! AI モジュールの公開型定義
//!
//! LLM が返す JSON スキーマ（Intent / Vision 解析）と、
//! プロンプトに埋め込む状況コンテキストを定義する。

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// コマンド解釈の結果として許されるアクションの閉集合。
///
/// LLM が閉集合外のタグを返した場合は `Unknown` にデコードされ、
/// ディスパッチャで「Unknown action」として終端する。
/// `CONVERSATION` へ黙って丸められることはない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    OpenApp,
    OpenFolder,
    SearchWeb,
    SearchYoutube,
    PlayYoutube,
    OpenWebsite,
    ScreenClick,
    ScreenAnalyze,
    TypeText,
    PressKey,
    Scroll,
    SearchFiles,
    OpenFile,
    Conversation,
    SystemCommand,
    /// 閉集合外のタグ。ディスパッチで終端失敗になる。
    #[serde(other)]
    Unknown,
}

impl Action {
    /// プロンプト・ログで使用するタグ表記
    pub fn tag(&self) -> &'static str {
        match self {
            Self::OpenApp => "OPEN_APP",
            Self::OpenFolder => "OPEN_FOLDER",
            Self::SearchWeb => "SEARCH_WEB",
            Self::SearchYoutube => "SEARCH_YOUTUBE",
            Self::PlayYoutube => "PLAY_YOUTUBE",
            Self::OpenWebsite => "OPEN_WEBSITE",
            Self::ScreenClick => "SCREEN_CLICK",
            Self::ScreenAnalyze => "SCREEN_ANALYZE",
            Self::TypeText => "TYPE_TEXT",
            Self::PressKey => "PRESS_KEY",
            Self::Scroll => "SCROLL",
            Self::SearchFiles => "SEARCH_FILES",
            Self::OpenFile => "OPEN_FILE",
            Self::Conversation => "CONVERSATION",
            Self::SystemCommand => "SYSTEM_COMMAND",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// ActionResult に載せる小文字の名前
    pub fn result_name(&self) -> &'static str {
        match self {
            Self::OpenApp => "open_app",
            Self::OpenFolder => "open_folder",
            Self::SearchWeb => "search_web",
            Self::SearchYoutube => "search_youtube",
            Self::PlayYoutube => "play_youtube",
            Self::OpenWebsite => "open_website",
            Self::ScreenClick => "screen_click",
            Self::ScreenAnalyze => "screen_analyze",
            Self::TypeText => "type_text",
            Self::PressKey => "press_key",
            Self::Scroll => "scroll",
            Self::SearchFiles => "search_files",
            Self::OpenFile => "open_file",
            Self::Conversation => "conversation",
            Self::SystemCommand => "system_command",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// 自然言語コマンドを解釈した構造化結果
///
/// すべてのフィールドにデフォルトがあるため、LLM が一部のキーを
/// 省略した JSON でもデコードできる。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Intent {
    pub action: Action,
    /// アプリ名・検索クエリ・URL・キーコンボ等の自由形式ターゲット
    pub target: String,
    /// 診断用の根拠テキスト。実行には使用しない。
    pub reasoning: String,
    /// 実行ファイル名の候補（優先順）
    pub executable_hints: Vec<String>,
    /// フォルダパステンプレートの候補（優先順）
    pub folder_paths: Vec<String>,
    /// アクション固有パラメータ（direction / amount / key / file_type 等）
    pub params: HashMap<String, Value>,
    /// ユーザーへ提示する自然言語テキスト
    pub response: String,
}

impl Default for Intent {
    fn default() -> Self {
        Self {
            action: Action::Conversation,
            target: String::new(),
            reasoning: String::new(),
            executable_hints: Vec::new(),
            folder_paths: Vec::new(),
            params: HashMap::new(),
            response: String::new(),
        }
    }
}

impl Intent {
    /// パラメータを文字列として取得する
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }

    /// パラメータを整数として取得する（数値・数字文字列の両方を受ける）
    pub fn param_i64(&self, key: &str) -> Option<i64> {
        match self.params.get(key)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// Vision 解析の結果アクション
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VisionAction {
    Click,
    Information,
    NotFound,
    /// スキーマ外のタグ。クリックのゲートは通らない。
    #[serde(other)]
    Unknown,
}

/// Vision 解析の確信度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl<'de> Deserialize<'de> for Confidence {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        // スキーマ外の値も保守的に low として扱う
        let s = String::deserialize(deserializer)?;
        Ok(match s.as_str() {
            "high" => Confidence::High,
            "medium" => Confidence::Medium,
            _ => Confidence::Low,
        })
    }
}

/// 画面座標（スクリーン寸法に対するパーセンテージ、0-100）
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Position {
    pub x: Option<f64>,
    pub y: Option<f64>,
}

/// 画面解析サブコールの構造化結果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionAnalysis {
    pub action: VisionAction,
    pub target_description: String,
    pub approximate_position: Option<Position>,
    pub confidence: Confidence,
    pub reasoning: String,
    pub response: String,
}

impl Default for VisionAnalysis {
    fn default() -> Self {
        Self {
            action: VisionAction::Information,
            target_description: String::new(),
            approximate_position: None,
            confidence: Confidence::Low,
            reasoning: String::new(),
            response: String::new(),
        }
    }
}

/// プロンプトに埋め込む状況コンテキスト
#[derive(Debug, Clone, Default)]
pub struct CommandContext {
    /// 呼び出し元の OS 種別（"linux" / "macos" / "windows" 等）
    pub os_type: String,
    /// 検出済みアプリケーション名（プロンプトには先頭 50 件のみ載る）
    pub detected_apps: Vec<String>,
    /// 直近の実行済みアクション（会話応答のコンテキストに使用）
    pub last_actions: Vec<String>,
}
