//! 設定ファイル管理
//!
//! `~/.config/jarvisd/config.toml` から TOML 形式の設定を読み込む。
//! ファイルが存在しない場合はデフォルト値を使用する。
//! API キーは設定ファイルではなく環境変数 `OPENAI_API_KEY` から読む。
//!
//! # 設定ファイル例
//!
//! ```toml
//! [llm]
//! provider = "openai"
//! model = "gpt-4o-mini"
//! vision_model = "gpt-4o"
//! timeout_secs = 30
//!
//! [voice]
//! enabled = false
//!
//! [limits.command]
//! max_requests = 60
//! window_seconds = 60
//!
//! [search]
//! locations = ["~/Documents", "~/Downloads"]
//! max_results = 50
//! ```

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::security::rate_limit::default_classes;
use crate::security::RateClass;

/// jarvisd の設定全体
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JarvisConfig {
    /// LLM 関連設定
    pub llm: LlmConfig,
    /// 音声読み上げ設定
    pub voice: VoiceConfig,
    /// レート制限クラス（クラス名 → 上限とウィンドウ秒）
    pub limits: HashMap<String, RateClass>,
    /// ファイル検索設定
    pub search: SearchConfig,
}

impl Default for JarvisConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            voice: VoiceConfig::default(),
            limits: default_classes(),
            search: SearchConfig::default(),
        }
    }
}

/// LLM 関連の設定
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// プロバイダ名（ログ・エラー文脈用）
    pub provider: String,
    /// OpenAI 互換 API のベース URL。未指定なら標準エンドポイント。
    pub api_base: Option<String>,
    /// テキストモデル名
    pub model: String,
    /// Vision モデル名
    pub vision_model: String,
    /// LLM 呼び出しのタイムアウト（秒）
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            api_base: None,
            model: "gpt-4o-mini".to_string(),
            vision_model: "gpt-4o".to_string(),
            timeout_secs: 30,
        }
    }
}

/// 音声読み上げの設定
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// 応答の読み上げを有効にするか
    pub enabled: bool,
    /// 読み上げ速度
    pub rate: u32,
    /// 音量 (0.0 - 1.0)
    pub volume: f32,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            rate: 230,
            volume: 1.0,
        }
    }
}

/// ファイル検索の設定
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// 検索対象ディレクトリ。空の場合はホーム配下の標準フォルダを使用する。
    pub locations: Vec<String>,
    /// 1 回の検索で返す最大件数
    pub max_results: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            locations: Vec::new(),
            max_results: 50,
        }
    }
}

impl JarvisConfig {
    /// 設定ファイルを読み込む。
    ///
    /// `~/.config/jarvisd/config.toml` が存在すればパースし、
    /// 存在しなければテンプレートを生成してデフォルト値を返す。
    /// パースエラーの場合は警告を表示してデフォルト値を返す。
    pub fn load() -> Self {
        let path = Self::config_path();
        debug!(path = %path.display(), "Loading config file");

        if !path.exists() {
            Self::create_default_config(&path);
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => match toml::from_str::<JarvisConfig>(&content) {
                Ok(config) => {
                    info!(
                        path = %path.display(),
                        model = %config.llm.model,
                        vision_model = %config.llm.vision_model,
                        voice_enabled = config.voice.enabled,
                        limit_classes = config.limits.len(),
                        "Config loaded successfully"
                    );
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to parse config file");
                    eprintln!("jarvisd: warning: failed to parse config file: {e}");
                    Self::default()
                }
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read config file");
                eprintln!("jarvisd: warning: failed to read config file: {e}");
                Self::default()
            }
        }
    }

    /// 設定ファイルのパスを返す。
    ///
    /// macOS / Linux 共通で `~/.config/jarvisd/config.toml` を使用する。
    /// `$HOME` が取得できない場合は `./.config/jarvisd/config.toml` に
    /// フォールバックする。
    pub fn config_path() -> PathBuf {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(".config/jarvisd/config.toml")
    }

    /// 設定ファイルが存在しない場合にテンプレートから生成する。
    ///
    /// 親ディレクトリが存在しなければ再帰的に作成する。
    /// 生成に失敗した場合は警告を表示するが、起動は継続する。
    fn create_default_config(path: &std::path::Path) {
        const TEMPLATE: &str = r#"# jarvisd configuration
#
# The API key is read from the OPENAI_API_KEY environment variable.

[llm]
# provider = "openai"
# api_base = "https://openrouter.ai/api/v1"
# model = "gpt-4o-mini"
# vision_model = "gpt-4o"
# timeout_secs = 30

[voice]
# enabled = false

# [limits.command]
# max_requests = 60
# window_seconds = 60

[search]
# locations = ["~/Documents", "~/Downloads"]
# max_results = 50
"#;

        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!(path = %parent.display(), error = %e, "Failed to create config directory");
                eprintln!("jarvisd: warning: failed to create config directory: {e}");
                return;
            }
        }

        match std::fs::write(path, TEMPLATE) {
            Ok(()) => {
                info!(path = %path.display(), "Created default config file");
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to create default config file");
                eprintln!("jarvisd: warning: failed to create config file: {e}");
            }
        }
    }
}
