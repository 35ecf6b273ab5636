//! OpenAI 互換 API クライアント — Jarvis Brain
//!
//! 自然言語コマンドを LLM に送信して構造化 Intent を復元する。
//! テキストモデルと Vision モデルをフラグで切り替え、すべての呼び出しを
//! 固定タイムアウトで包む。暗黙のリトライは行わない。

use std::time::Duration;

use anyhow::{Context, Result};
use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImage,
        ChatCompletionRequestMessageContentPartText, ChatCompletionRequestUserMessage,
        ChatCompletionRequestUserMessageContent, ChatCompletionRequestUserMessageContentPart,
        CreateChatCompletionRequest, ImageUrl,
    },
    Client,
};
use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

use crate::config::LlmConfig;
use crate::error::JarvisError;

use super::prompts;
use super::recover::{self, Recovery};
use super::types::{CommandContext, Intent, VisionAnalysis};
use super::Brain;

/// OpenAI 互換 API を話す Brain 実装
pub struct JarvisBrain {
    client: Client<OpenAIConfig>,
    provider: String,
    model: String,
    vision_model: String,
    timeout: Duration,
}

impl JarvisBrain {
    /// OPENAI_API_KEY 環境変数と LLM 設定からクライアントを初期化する。
    pub fn new(llm: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .context("OPENAI_API_KEY is not set. AI features are disabled.")?;

        if api_key.is_empty() || api_key == "your_openai_api_key" {
            anyhow::bail!("OPENAI_API_KEY is not configured. Please set a valid API key in .env");
        }

        let mut config = OpenAIConfig::new().with_api_key(&api_key);
        if let Some(ref api_base) = llm.api_base {
            config = config.with_api_base(api_base);
        }

        info!(
            provider = %llm.provider,
            model = %llm.model,
            vision_model = %llm.vision_model,
            timeout_secs = llm.timeout_secs,
            "Jarvis brain initialized"
        );

        Ok(Self {
            client: Client::with_config(config),
            provider: llm.provider.clone(),
            model: llm.model.clone(),
            vision_model: llm.vision_model.clone(),
            timeout: Duration::from_secs(llm.timeout_secs),
        })
    }

    /// LLM を 1 往復呼び出し、完了メッセージの本文を返す。
    ///
    /// `use_vision` でモデルを切り替える。タイムアウト・トランスポート失敗・
    /// 空ボディはすべて分類済みの `LlmError` として即座に失敗する。
    async fn call_llm(
        &self,
        messages: Vec<ChatCompletionRequestMessage>,
        use_vision: bool,
    ) -> Result<String, JarvisError> {
        let model = if use_vision {
            &self.vision_model
        } else {
            &self.model
        };

        let request = CreateChatCompletionRequest {
            model: model.clone(),
            messages,
            ..Default::default()
        };

        debug!(model = %model, use_vision = use_vision, "Sending LLM request");

        let response = tokio::time::timeout(self.timeout, self.client.chat().create(request))
            .await
            .map_err(|_| {
                warn!(model = %model, timeout_secs = self.timeout.as_secs(), "LLM request timed out");
                JarvisError::llm(
                    "LLM request timed out",
                    Some(self.provider.as_str()),
                    Some(model.as_str()),
                )
            })?
            .map_err(|e| {
                warn!(model = %model, error = %e, "LLM request failed");
                JarvisError::llm(
                    format!("LLM request failed: {e}"),
                    Some(self.provider.as_str()),
                    Some(model.as_str()),
                )
            })?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(JarvisError::llm(
                "Empty response from AI service",
                Some(self.provider.as_str()),
                Some(model.as_str()),
            ));
        }

        debug!(
            model = %model,
            response_length = content.len(),
            "LLM response received"
        );
        Ok(content)
    }

    /// テキストのみのユーザーメッセージを構築する
    fn user_text(content: String) -> ChatCompletionRequestMessage {
        ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
            content: ChatCompletionRequestUserMessageContent::Text(content),
            name: None,
        })
    }

    /// テキスト + base64 画像のユーザーメッセージを構築する
    fn user_text_with_image(text: String, image_base64: &str) -> ChatCompletionRequestMessage {
        ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
            content: ChatCompletionRequestUserMessageContent::Array(vec![
                ChatCompletionRequestUserMessageContentPart::Text(
                    ChatCompletionRequestMessageContentPartText { text },
                ),
                ChatCompletionRequestUserMessageContentPart::ImageUrl(
                    ChatCompletionRequestMessageContentPartImage {
                        image_url: ImageUrl {
                            url: format!("data:image/png;base64,{image_base64}"),
                            detail: None,
                        },
                    },
                ),
            ]),
            name: None,
        })
    }
}

#[async_trait]
impl Brain for JarvisBrain {
    async fn interpret(
        &self,
        command: &str,
        context: &CommandContext,
    ) -> Result<Intent, JarvisError> {
        let preview: String = command.chars().take(100).collect();
        info!(command = %preview, "Interpreting command");

        let prompt = prompts::interpretation_prompt(command, context);
        let raw = self.call_llm(vec![Self::user_text(prompt)], false).await?;

        match recover::recover_intent(&raw) {
            Recovery::Parsed(intent) => {
                info!(action = %intent.action, target = %intent.target, "Command interpreted successfully");
                Ok(intent)
            }
            Recovery::Fallback(intent) => {
                // デコード不能でもハードエラーにはせず会話応答へ縮退する
                warn!(
                    response_length = raw.len(),
                    "Failed to parse JSON from AI response, falling back to conversation"
                );
                Ok(intent)
            }
        }
    }

    async fn analyze_screen_content(
        &self,
        screenshot_base64: &str,
        user_query: &str,
    ) -> Result<VisionAnalysis, JarvisError> {
        let prompt = prompts::vision_prompt(user_query);
        let raw = self
            .call_llm(
                vec![Self::user_text_with_image(prompt, screenshot_base64)],
                true,
            )
            .await?;

        let recovery = recover::recover_vision(&raw);
        if recovery.is_fallback() {
            warn!("Failed to parse JSON from vision response, degrading to information");
        }
        let analysis = recovery.into_inner();
        info!(action = ?analysis.action, confidence = ?analysis.confidence, "Screen analysis completed");
        Ok(analysis)
    }

    async fn conversation_reply(
        &self,
        message: &str,
        context: &CommandContext,
    ) -> Result<String, JarvisError> {
        let prompt = prompts::conversation_prompt(message, context);
        let raw = self.call_llm(vec![Self::user_text(prompt)], false).await?;
        info!("Generated conversational response");
        Ok(raw.trim().to_string())
    }

    async fn construct_url(&self, website_input: &str) -> String {
        let prompt = prompts::url_prompt(website_input);
        let url = match self.call_llm(vec![Self::user_text(prompt)], false).await {
            Ok(raw) => normalize_url_response(&raw),
            Err(e) => {
                warn!(error = %e, site = %website_input, "URL construction failed, using fallback");
                None
            }
        };

        let url = url.unwrap_or_else(|| fallback_url(website_input));
        info!(site = %website_input, url = %url, "Constructed URL");
        url
    }
}

/// LLM レスポンス中の URL パターン
fn url_in_text() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"https?://[^\s<>"{}|\\^`\[\]]+"#).expect("invalid url extraction pattern")
    })
}

/// 重複したスキームプレフィックス（https://https://...）のパターン
fn duplicated_scheme() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"https?://(https?://)+").expect("invalid scheme pattern"))
}

/// LLM の URL レスポンスを正規化する。
///
/// フェンスを除去し、最初の URL パターンを抽出、重複スキームを潰す。
/// URL パターンが見つからなければ None（呼び出し側がフォールバックする）。
fn normalize_url_response(raw: &str) -> Option<String> {
    let cleaned = recover::strip_code_fences(raw);
    let candidate = url_in_text().find(&cleaned)?.as_str();
    let normalized = duplicated_scheme().replace_all(candidate, "https://");
    Some(normalized.into_owned())
}

/// LLM に頼らない単純な URL フォールバック
fn fallback_url(website_input: &str) -> String {
    if website_input.starts_with("http") {
        website_input.to_string()
    } else {
        format!("https://www.{website_input}.com")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn new_fails_without_api_key() {
        // OPENAI_API_KEY が未設定の場合にエラーを返すことを確認
        let original = std::env::var("OPENAI_API_KEY").ok();
        std::env::remove_var("OPENAI_API_KEY");

        let result = JarvisBrain::new(&LlmConfig::default());
        assert!(result.is_err());

        if let Some(key) = original {
            std::env::set_var("OPENAI_API_KEY", key);
        }
    }

    #[test]
    #[serial]
    fn new_fails_with_placeholder_key() {
        let original = std::env::var("OPENAI_API_KEY").ok();
        std::env::set_var("OPENAI_API_KEY", "your_openai_api_key");

        let result = JarvisBrain::new(&LlmConfig::default());
        assert!(result.is_err());

        match original {
            Some(key) => std::env::set_var("OPENAI_API_KEY", key),
            None => std::env::remove_var("OPENAI_API_KEY"),
        }
    }

    #[test]
    fn normalize_extracts_url_from_prose() {
        let raw = "Here you go: https://github.com — enjoy!";
        assert_eq!(
            normalize_url_response(raw),
            Some("https://github.com".to_string())
        );
    }

    #[test]
    fn normalize_collapses_duplicated_schemes() {
        assert_eq!(
            normalize_url_response("https://https://www.youtube.com"),
            Some("https://www.youtube.com".to_string())
        );
    }

    #[test]
    fn normalize_strips_code_fences() {
        let raw = "```\nhttps://www.reddit.com\n```";
        assert_eq!(
            normalize_url_response(raw),
            Some("https://www.reddit.com".to_string())
        );
    }

    #[test]
    fn normalize_returns_none_without_url() {
        assert_eq!(normalize_url_response("I don't know that site."), None);
    }

    #[test]
    fn fallback_url_defaults_to_www_com() {
        assert_eq!(fallback_url("youtube"), "https://www.youtube.com");
        assert_eq!(fallback_url("https://github.com"), "https://github.com");
    }
}
