//! リクエスト/レスポンスのエンベロープ型
//!
//! 成功時は ActionResult と解釈サマリを、失敗時は安定した error_code を
//! 持つエラーエンベロープを返す。内部情報はエンベロープへ載せない。

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::actions::ActionResult;
use crate::ai::Intent;
use crate::error::JarvisError;

/// 受信コマンドリクエスト
#[derive(Debug, Clone, Deserialize)]
pub struct CommandRequest {
    /// 自然言語コマンド本文
    pub command: String,
    /// 呼び出し元識別子（省略時は "anonymous" として扱う）
    #[serde(default)]
    pub user_id: Option<String>,
    /// 直近の実行済みアクション（会話コンテキスト用）
    #[serde(default)]
    pub last_actions: Vec<String>,
}

impl CommandRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            user_id: None,
            last_actions: Vec::new(),
        }
    }
}

/// 解釈結果のサマリ（診断用）
#[derive(Debug, Clone, Serialize)]
pub struct InterpretationSummary {
    pub action: String,
    pub target: String,
    pub reasoning: String,
}

impl From<&Intent> for InterpretationSummary {
    fn from(intent: &Intent) -> Self {
        Self {
            action: intent.action.tag().to_string(),
            target: intent.target.clone(),
            reasoning: intent.reasoning.clone(),
        }
    }
}

/// 成功レスポンス
#[derive(Debug, Serialize)]
pub struct CommandResponse {
    pub success: bool,
    pub request_id: String,
    pub data: ActionResult,
    pub interpretation: InterpretationSummary,
}

/// エラーエンベロープの本体
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error_code: String,
    pub message: String,
    pub details: Value,
}

/// 検証・レート制限・LLM 失敗時のエラーエンベロープ
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error: ErrorBody,
}

impl From<&JarvisError> for ErrorEnvelope {
    fn from(error: &JarvisError) -> Self {
        Self {
            success: false,
            error: ErrorBody {
                error_code: error.error_code().to_string(),
                message: error.to_string(),
                details: error.details(),
            },
        }
    }
}

/// interpret-only モードで使用するコンテキスト情報
#[derive(Debug, Serialize)]
pub struct ContextUsed {
    pub apps_count: usize,
    pub system_type: String,
}

/// interpret-only モードのレスポンス
#[derive(Debug, Serialize)]
pub struct InterpretationReport {
    pub command: String,
    pub interpretation: Intent,
    pub context_used: ContextUsed,
}
