//! エラー型定義
//!
//! パイプライン全体で使用する構造化エラー。各エラーは安定した `error_code` と
//! 付帯情報（details）を持ち、API エンベロープへそのまま変換できる。
//! 検証・レート制限エラーは 4xx 相当、LLM・内部エラーは 5xx 相当に分類される。

use serde_json::{json, Map, Value};
use thiserror::Error;

/// HTTP 相当のエラー分類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// 入力不正・アドミッション拒否（4xx 相当）
    ClientError,
    /// 外部サービス・内部処理の失敗（5xx 相当）
    ServerError,
}

/// jarvisd の構造化エラー
#[derive(Debug, Error)]
pub enum JarvisError {
    /// 入力検証の失敗（危険なパターン、長さ超過、不正なパス・URL 等）
    #[error("{message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    /// レート制限によるアドミッション拒否
    #[error("{message}")]
    RateLimit {
        message: String,
        limit: u32,
        reset_hint_secs: u64,
    },

    /// LLM 呼び出しの失敗（タイムアウト・ネットワーク・空レスポンス）
    #[error("{message}")]
    Llm {
        message: String,
        provider: Option<String>,
        model: Option<String>,
    },

    /// 解釈結果から Intent を構築できなかった
    #[error("{message}")]
    Command {
        message: String,
        command: Option<String>,
    },

    /// システム操作（プロセス起動・フォルダオープン等）の失敗
    #[error("{message}")]
    System {
        message: String,
        operation: String,
        target: String,
    },

    /// アプリケーション操作の失敗
    #[error("{message}")]
    Application { message: String, app_name: String },

    /// 画面キャプチャ・解析・クリック操作の失敗
    #[error("{message}")]
    Vision { message: String, operation: String },
}

impl JarvisError {
    /// 検証エラーを生成するヘルパー
    pub fn validation(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::Validation {
            message: message.into(),
            field: field.map(str::to_string),
        }
    }

    /// レート制限エラーを生成するヘルパー
    pub fn rate_limit(message: impl Into<String>, limit: u32, reset_hint_secs: u64) -> Self {
        Self::RateLimit {
            message: message.into(),
            limit,
            reset_hint_secs,
        }
    }

    /// LLM エラーを生成するヘルパー
    pub fn llm(message: impl Into<String>, provider: Option<&str>, model: Option<&str>) -> Self {
        Self::Llm {
            message: message.into(),
            provider: provider.map(str::to_string),
            model: model.map(str::to_string),
        }
    }

    /// システム操作エラーを生成するヘルパー
    pub fn system(message: impl Into<String>, operation: &str, target: &str) -> Self {
        Self::System {
            message: message.into(),
            operation: operation.to_string(),
            target: target.to_string(),
        }
    }

    /// アプリケーション操作エラーを生成するヘルパー
    pub fn application(message: impl Into<String>, app_name: &str) -> Self {
        Self::Application {
            message: message.into(),
            app_name: app_name.to_string(),
        }
    }

    /// Vision 操作エラーを生成するヘルパー
    pub fn vision(message: impl Into<String>, operation: &str) -> Self {
        Self::Vision {
            message: message.into(),
            operation: operation.to_string(),
        }
    }

    /// API エンベロープ用の安定したエラーコード
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::RateLimit { .. } => "RATE_LIMIT_ERROR",
            Self::Llm { .. } => "LLM_ERROR",
            Self::Command { .. } => "COMMAND_ERROR",
            Self::System { .. } => "SYSTEM_ERROR",
            Self::Application { .. } => "APPLICATION_ERROR",
            Self::Vision { .. } => "VISION_ERROR",
        }
    }

    /// HTTP 相当の分類。検証・レート制限・解釈不能な入力は呼び出し側の問題、
    /// それ以外はサーバ側。
    pub fn status_class(&self) -> StatusClass {
        match self {
            Self::Validation { .. } | Self::RateLimit { .. } | Self::Command { .. } => {
                StatusClass::ClientError
            }
            _ => StatusClass::ServerError,
        }
    }

    /// エンベロープに載せる付帯情報。内部情報（スタックトレース等）は含めない。
    pub fn details(&self) -> Value {
        let mut map = Map::new();
        match self {
            Self::Validation { field, .. } => {
                if let Some(field) = field {
                    map.insert("field".into(), json!(field));
                }
            }
            Self::RateLimit {
                limit,
                reset_hint_secs,
                ..
            } => {
                map.insert("limit".into(), json!(limit));
                map.insert("reset_hint_secs".into(), json!(reset_hint_secs));
            }
            Self::Llm {
                provider, model, ..
            } => {
                if let Some(provider) = provider {
                    map.insert("provider".into(), json!(provider));
                }
                if let Some(model) = model {
                    map.insert("model".into(), json!(model));
                }
            }
            Self::Command { command, .. } => {
                if let Some(command) = command {
                    // 長大なコマンドはエンベロープでは切り詰める
                    let preview: String = command.chars().take(100).collect();
                    map.insert("command".into(), json!(preview));
                }
            }
            Self::System {
                operation, target, ..
            } => {
                map.insert("operation".into(), json!(operation));
                map.insert("target".into(), json!(target));
            }
            Self::Application { app_name, .. } => {
                map.insert("app_name".into(), json!(app_name));
            }
            Self::Vision { operation, .. } => {
                map.insert("operation".into(), json!(operation));
            }
        }
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(
            JarvisError::validation("bad", Some("command")).error_code(),
            "VALIDATION_ERROR"
        );
        assert_eq!(
            JarvisError::rate_limit("limited", 60, 60).error_code(),
            "RATE_LIMIT_ERROR"
        );
        assert_eq!(
            JarvisError::llm("down", None, None).error_code(),
            "LLM_ERROR"
        );
    }

    #[test]
    fn status_class_splits_client_and_server() {
        assert_eq!(
            JarvisError::validation("bad", None).status_class(),
            StatusClass::ClientError
        );
        assert_eq!(
            JarvisError::rate_limit("limited", 60, 60).status_class(),
            StatusClass::ClientError
        );
        assert_eq!(
            JarvisError::llm("down", None, None).status_class(),
            StatusClass::ServerError
        );
        assert_eq!(
            JarvisError::system("fail", "open_folder", "downloads").status_class(),
            StatusClass::ServerError
        );
    }

    #[test]
    fn details_carry_context_without_internals() {
        let err = JarvisError::system("boom", "open_app", "chrome");
        let details = err.details();
        assert_eq!(details["operation"], "open_app");
        assert_eq!(details["target"], "chrome");
    }

    #[test]
    fn command_details_are_truncated() {
        let long = "x".repeat(500);
        let err = JarvisError::Command {
            message: "no intent".into(),
            command: Some(long),
        };
        let details = err.details();
        assert_eq!(details["command"].as_str().unwrap().len(), 100);
    }
}
