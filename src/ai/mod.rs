//! コマンド解釈モジュール
//!
//! 自然言語コマンドを LLM に送信して構造化 Intent を復元する。
//! ディスパッチャやパイプラインはこの `Brain` トレイト越しに解釈機能を
//! 利用するため、テストではスクリプト化したフェイクに差し替えられる。

pub mod client;
pub mod prompts;
pub mod recover;
pub mod types;

use async_trait::async_trait;

use crate::error::JarvisError;

pub use client::JarvisBrain;
#[allow(unused_imports)]
pub use types::{Action, CommandContext, Confidence, Intent, Position, VisionAction, VisionAnalysis};

/// 解釈・会話・画面解析・URL 構築の LLM 境界
#[async_trait]
pub trait Brain: Send + Sync {
    /// 自然言語コマンドを構造化 Intent に解釈する。
    ///
    /// LLM 呼び出し自体の失敗（タイムアウト・ネットワーク・空ボディ）は
    /// `LlmError` として失敗する。レスポンスがデコード不能なだけの場合は
    /// `CONVERSATION` へのフォールバック Intent で成功する。
    async fn interpret(
        &self,
        command: &str,
        context: &CommandContext,
    ) -> Result<Intent, JarvisError>;

    /// base64 スクリーンショットとクエリから画面解析結果を得る。
    async fn analyze_screen_content(
        &self,
        screenshot_base64: &str,
        user_query: &str,
    ) -> Result<VisionAnalysis, JarvisError>;

    /// 会話応答テキストを生成する（スキーマ指定なし）。
    async fn conversation_reply(
        &self,
        message: &str,
        context: &CommandContext,
    ) -> Result<String, JarvisError>;

    /// サイト名から URL を構築する。失敗時は単純なフォールバック URL を
    /// 返すため、このメソッド自体は失敗しない。
    async fn construct_url(&self, website_input: &str) -> String;
}
