//! コマンド処理パイプライン
//!
//! 検証 → レート制限 → 解釈 → ディスパッチ → エンベロープ組み立ての
//! 一連の流れを束ねる。依存はすべてコンストラクタで注入され、
//! 共有可変状態はレートリミッタのウィンドウテーブルだけ。
//! 各リクエストは独立したタスクで並行に処理できる。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::actions::Dispatcher;
use crate::ai::{Brain, CommandContext};
use crate::api::{CommandRequest, CommandResponse, ContextUsed, InterpretationReport};
use crate::capabilities::{SpeechOutput, SystemControl};
use crate::config::JarvisConfig;
use crate::error::JarvisError;
use crate::security::{validator, RateLimiter};

/// プロンプトコンテキストに載せる検出済みアプリの上限
const MAX_CONTEXT_APPS: usize = 50;

/// コマンドサジェストの最大件数
const MAX_SUGGESTIONS: usize = 5;

/// サジェストテーブル（キーワード → 候補）
const SUGGESTION_TABLE: [(&str, &[&str]); 4] = [
    (
        "open",
        &["open chrome", "open firefox", "open calculator", "open folder", "open file"],
    ),
    ("play", &["play music", "play video", "play youtube"]),
    ("search", &["search web", "search files", "search youtube"]),
    ("type", &["type hello", "type message"]),
];

/// コマンド解釈・実行パイプライン
pub struct JarvisPipeline {
    limiter: RateLimiter,
    brain: Arc<dyn Brain>,
    dispatcher: Dispatcher,
    system: Arc<dyn SystemControl>,
    speech: Option<Arc<dyn SpeechOutput>>,
    /// 読み上げ中フラグ（二重再生の抑止のみに使う）
    is_speaking: Arc<AtomicBool>,
    os_type: String,
}

impl JarvisPipeline {
    pub fn new(
        config: &JarvisConfig,
        brain: Arc<dyn Brain>,
        dispatcher: Dispatcher,
        system: Arc<dyn SystemControl>,
        speech: Option<Arc<dyn SpeechOutput>>,
    ) -> Self {
        Self {
            limiter: RateLimiter::new(config.limits.clone()),
            brain,
            dispatcher,
            system,
            speech,
            is_speaking: Arc::new(AtomicBool::new(false)),
            os_type: detect_os_type(),
        }
    }

    /// コマンドを検証・解釈・実行して成功エンベロープを返す。
    ///
    /// 検証・レート制限エラーは解釈前に、LLM エラーは解釈中にリクエストを
    /// 終端させる。Intent が得られた後のハンドラ失敗はここまで伝播せず、
    /// `data.success == false` の正常レスポンスになる。
    pub async fn execute(&self, request: &CommandRequest) -> Result<CommandResponse, JarvisError> {
        let started = Instant::now();
        let request_id = Uuid::new_v4().to_string();

        let command = validated_command(request)?;
        let caller = request.user_id.as_deref().unwrap_or("anonymous");
        self.admit(caller, "command")?;

        let context = self.build_context(&request.last_actions);
        let intent = self.brain.interpret(&command, &context).await?;
        info!(
            request_id = %request_id,
            action = %intent.action,
            target = %intent.target,
            "Command interpretation"
        );

        let mut result = self.dispatcher.dispatch(&intent, &command, &context).await;
        result.execution_time = round2(started.elapsed().as_secs_f64());

        if result.success && !result.response.is_empty() {
            self.speak_in_background(&result.response);
        }

        Ok(CommandResponse {
            success: true,
            request_id,
            interpretation: (&intent).into(),
            data: result,
        })
    }

    /// コマンドを解釈のみ行い、実行はしない。
    pub async fn interpret_only(
        &self,
        request: &CommandRequest,
    ) -> Result<InterpretationReport, JarvisError> {
        let command = validated_command(request)?;
        let caller = request.user_id.as_deref().unwrap_or("anonymous");
        self.admit(caller, "api_request")?;

        let context = self.build_context(&request.last_actions);
        let intent = self.brain.interpret(&command, &context).await?;

        Ok(InterpretationReport {
            command,
            interpretation: intent,
            context_used: ContextUsed {
                apps_count: context.detected_apps.len(),
                system_type: context.os_type,
            },
        })
    }

    /// 部分入力に対するコマンドサジェストを返す（最大 5 件）。
    pub fn suggestions(partial: &str) -> Vec<String> {
        let partial = partial.trim().to_lowercase();
        if partial.is_empty() {
            return Vec::new();
        }

        let mut candidates: Vec<&str> = Vec::new();
        for (keyword, items) in SUGGESTION_TABLE {
            if partial.contains(keyword) {
                candidates.extend_from_slice(items);
            }
        }

        candidates
            .into_iter()
            .filter(|candidate| candidate.contains(&partial))
            .take(MAX_SUGGESTIONS)
            .map(str::to_string)
            .collect()
    }

    /// レート制限のアドミッション判定
    fn admit(&self, identifier: &str, class: &str) -> Result<(), JarvisError> {
        if self.limiter.is_allowed(identifier, class) {
            return Ok(());
        }

        let (limit, window_seconds) = self
            .limiter
            .class(class)
            .map(|c| (c.max_requests, c.window_seconds))
            .unwrap_or((0, 0));
        let remaining = self.limiter.remaining(identifier, class);

        warn!(identifier = %identifier, class = %class, "Request rejected by rate limiter");
        Err(JarvisError::rate_limit(
            format!("Rate limit exceeded. {remaining} requests remaining."),
            limit,
            window_seconds,
        ))
    }

    /// プロンプトへ渡す状況コンテキストを組み立てる
    fn build_context(&self, last_actions: &[String]) -> CommandContext {
        let mut detected_apps = self.system.installed_apps();
        detected_apps.truncate(MAX_CONTEXT_APPS);

        CommandContext {
            os_type: self.os_type.clone(),
            detected_apps,
            last_actions: last_actions.to_vec(),
        }
    }

    /// 応答テキストをバックグラウンドで読み上げる（fire-and-forget）。
    ///
    /// タスクはリクエスト/レスポンスサイクルより長生きしてよく、
    /// 失敗しても返却済みの結果には影響しない。
    fn speak_in_background(&self, text: &str) {
        let Some(speech) = self.speech.clone() else {
            return;
        };

        if self.is_speaking.swap(true, Ordering::SeqCst) {
            debug!("Speech already in progress, skipping");
            return;
        }

        let flag = Arc::clone(&self.is_speaking);
        let text = text.to_string();
        tokio::spawn(async move {
            if let Err(e) = speech.speak(&text).await {
                warn!(error = %e, "Background speech failed");
            }
            flag.store(false, Ordering::SeqCst);
        });
    }
}

/// 検証済みコマンドを取り出す。サニタイズで本文が残らなかった場合は
/// 解釈対象がないものとしてエラーにする。
fn validated_command(request: &CommandRequest) -> Result<String, JarvisError> {
    let command = validator::validate_command(&request.command)?;
    if command.is_empty() {
        return Err(JarvisError::Command {
            message: "Command has no usable content".to_string(),
            command: Some(request.command.clone()),
        });
    }
    Ok(command)
}

/// 実行時の OS 種別を返す。
fn detect_os_type() -> String {
    sysinfo::System::name().unwrap_or_else(|| std::env::consts::OS.to_string())
}

/// 小数第 2 位への丸め（エンベロープの execution_time 用）
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
