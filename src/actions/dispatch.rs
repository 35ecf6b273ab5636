//! Intent のディスパッチ
//!
//! 15 アクションの閉集合を網羅的な match で Capability 呼び出しへ写像する。
//! ハンドラ内で発生したエラーはすべてハンドラ境界で捕捉され、
//! `ActionResult { success: false, .. }` に変換される。
//! エラーがディスパッチャの外へ伝播することはない。

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::ai::{Action, Brain, CommandContext, Confidence, Intent, VisionAction};
use crate::capabilities::{
    FileSearch, MediaControl, ScrollDirection, SystemControl, VisionControl,
};
use crate::error::JarvisError;
use crate::security::validator;

use super::ActionResult;

/// SYSTEM_COMMAND で即時拒否する破壊的コマンドの部分文字列
const BLOCKED_COMMAND_PATTERNS: [&str; 12] = [
    "format",
    "del ",
    "rmdir",
    "shutdown",
    "reboot",
    "rm -rf",
    "sudo rm",
    "dd if=",
    ":(){ :|:& };:",
    "fork bomb",
    "virus",
    "malware",
];

/// ファイル検索ハンドラが要求する最大ヒット数
const MAX_FILE_RESULTS: usize = 50;

/// Intent → Capability 呼び出し → ActionResult のディスパッチャ
pub struct Dispatcher {
    system: Arc<dyn SystemControl>,
    vision: Arc<dyn VisionControl>,
    media: Arc<dyn MediaControl>,
    files: Arc<dyn FileSearch>,
    brain: Arc<dyn Brain>,
}

/// Interpreter が response を返していればそれを、なければ既定文を使う。
fn text_or(supplied: &str, default: String) -> String {
    if supplied.trim().is_empty() {
        default
    } else {
        supplied.to_string()
    }
}

impl Dispatcher {
    pub fn new(
        system: Arc<dyn SystemControl>,
        vision: Arc<dyn VisionControl>,
        media: Arc<dyn MediaControl>,
        files: Arc<dyn FileSearch>,
        brain: Arc<dyn Brain>,
    ) -> Self {
        Self {
            system,
            vision,
            media,
            files,
            brain,
        }
    }

    /// Intent をディスパッチする。
    ///
    /// ハンドラのエラーはここで `success: false` の結果に変換して
    /// 失敗を局所化する。リクエスト自体は正常に完了する。
    pub async fn dispatch(
        &self,
        intent: &Intent,
        original_command: &str,
        context: &CommandContext,
    ) -> ActionResult {
        debug!(action = %intent.action, target = %intent.target, "Dispatching intent");

        match self.run_handler(intent, original_command, context).await {
            Ok(result) => result,
            Err(e) => {
                error!(action = %intent.action, error = %e, "Action handler failed");
                ActionResult::fail(
                    intent.action,
                    format!("Error executing {}: {e}", intent.action),
                )
            }
        }
    }

    /// アクションタグごとのハンドラ本体（網羅的 match）
    async fn run_handler(
        &self,
        intent: &Intent,
        original_command: &str,
        context: &CommandContext,
    ) -> Result<ActionResult, JarvisError> {
        let action = intent.action;
        let target = intent.target.as_str();

        match action {
            Action::Conversation => {
                let text = if !intent.response.trim().is_empty() {
                    intent.response.clone()
                } else {
                    match self.brain.conversation_reply(original_command, context).await {
                        Ok(reply) => reply,
                        Err(e) => {
                            // 会話は常に成功させる。生成に失敗したら定型文へ。
                            warn!(error = %e, "Conversation reply generation failed");
                            "I'm afraid I couldn't form a proper reply, sir.".to_string()
                        }
                    }
                };
                Ok(ActionResult::ok(
                    action,
                    text,
                    json!({"type": "chat_response"}),
                ))
            }

            Action::OpenApp => {
                let success = self
                    .system
                    .open_application(target, &intent.executable_hints)
                    .await?;
                let response = if success {
                    text_or(&intent.response, format!("Opening {target}"))
                } else {
                    format!("Couldn't find {target}")
                };
                Ok(ActionResult {
                    success,
                    response,
                    ..ActionResult::ok(action, "", json!({"app_name": target}))
                })
            }

            Action::OpenFolder => {
                let success = self
                    .system
                    .open_folder(target, &intent.folder_paths)
                    .await?;
                let response = if success {
                    text_or(&intent.response, format!("Opening {target}"))
                } else {
                    format!("Couldn't find {target} folder")
                };
                Ok(ActionResult {
                    success,
                    response,
                    ..ActionResult::ok(action, "", json!({"folder_name": target}))
                })
            }

            Action::SearchWeb => {
                let success = self.system.search_web(target).await?;
                Ok(ActionResult {
                    success,
                    response: text_or(&intent.response, format!("Searching the web for {target}")),
                    ..ActionResult::ok(action, "", json!({"query": target}))
                })
            }

            Action::SearchYoutube => {
                let success = self.media.search_youtube(target).await?;
                Ok(ActionResult {
                    success,
                    response: text_or(&intent.response, format!("Searching YouTube for {target}")),
                    ..ActionResult::ok(action, "", json!({"query": target}))
                })
            }

            Action::PlayYoutube => self.play_youtube(intent).await,

            Action::OpenWebsite => {
                let url = self.brain.construct_url(target).await;
                // LLM が構築した URL も検証を通してからブラウザへ渡す
                let url = match validator::validate_url(&url) {
                    Ok(url) => url,
                    Err(e) => {
                        warn!(url = %url, error = %e, "Constructed URL failed validation");
                        format!("https://www.{target}.com")
                    }
                };
                let success = self.media.browse_url(&url).await?;
                Ok(ActionResult {
                    success,
                    response: text_or(&intent.response, format!("Opening {target}")),
                    ..ActionResult::ok(action, "", json!({"website": target, "url": url}))
                })
            }

            Action::TypeText => {
                let success = self.system.type_text(target, 50).await?;
                Ok(ActionResult {
                    success,
                    response: if success {
                        text_or(&intent.response, "Typing text".to_string())
                    } else {
                        "Failed to type text".to_string()
                    },
                    ..ActionResult::ok(action, "", json!({"text": target}))
                })
            }

            Action::PressKey => {
                let key = intent.param_str("key").unwrap_or(target);
                let success = self.system.press_key(key).await?;
                Ok(ActionResult {
                    success,
                    response: if success {
                        text_or(&intent.response, format!("Pressing {key}"))
                    } else {
                        format!("Failed to press {key}")
                    },
                    ..ActionResult::ok(action, "", json!({"key": key}))
                })
            }

            Action::Scroll => self.scroll(intent).await,

            Action::SearchFiles => {
                let file_type = intent.param_str("file_type");
                let hits = self
                    .files
                    .search_files(target, file_type, MAX_FILE_RESULTS)
                    .await?;
                let count = hits.len();
                Ok(ActionResult {
                    // 0 件でも結果は count 付きで返す。成功はヒットがあるときのみ。
                    success: count > 0,
                    response: text_or(&intent.response, format!("Found {count} results")),
                    ..ActionResult::ok(
                        action,
                        "",
                        json!({
                            "query": target,
                            "file_type": file_type,
                            "results": hits,
                            "count": count,
                        }),
                    )
                })
            }

            Action::OpenFile => self.open_file(intent).await,

            Action::ScreenClick => self.screen_click(original_command).await,

            Action::ScreenAnalyze => {
                let analysis = self.vision.analyze_screen(original_command).await?;
                let response = text_or(&analysis.response, "Screen analyzed".to_string());
                Ok(ActionResult::ok(
                    action,
                    response,
                    json!({"analysis": analysis, "screenshot_available": true}),
                ))
            }

            Action::SystemCommand => self.system_command(intent).await,

            Action::Unknown => {
                // 閉集合外のタグは Capability を呼ばずに終端する
                warn!(target = %target, "Unknown action tag, refusing to dispatch");
                Ok(ActionResult::fail(action, "Unknown action"))
            }
        }
    }

    /// PLAY_YOUTUBE: 直接再生を試み、失敗したら検索へフォールバックする。
    async fn play_youtube(&self, intent: &Intent) -> Result<ActionResult, JarvisError> {
        let target = intent.target.as_str();

        match self.media.play_youtube_video(target).await {
            Ok(true) => Ok(ActionResult {
                response: text_or(&intent.response, format!("Playing {target}")),
                ..ActionResult::ok(Action::PlayYoutube, "", json!({"video_query": target}))
            }),
            Ok(false) | Err(_) => {
                // 直接再生の失敗は例外にせず、必ず検索フォールバックの結果を報告する
                info!(query = %target, "Direct playback failed, falling back to YouTube search");
                let fallback = match self.media.search_youtube(target).await {
                    Ok(success) => success,
                    Err(e) => {
                        warn!(error = %e, "YouTube search fallback also failed");
                        false
                    }
                };
                let response = if fallback {
                    format!("Couldn't play {target} directly, showing search results instead")
                } else {
                    format!("Couldn't play {target}")
                };
                Ok(ActionResult {
                    success: fallback,
                    response,
                    ..ActionResult::ok(
                        Action::PlayYoutube,
                        "",
                        json!({"video_query": target, "fallback": "search_youtube"}),
                    )
                })
            }
        }
    }

    /// SCROLL: 方向を閉集合で検証してから Capability を呼ぶ。
    async fn scroll(&self, intent: &Intent) -> Result<ActionResult, JarvisError> {
        let direction_str = intent
            .param_str("direction")
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| {
                if intent.target.is_empty() {
                    "down"
                } else {
                    intent.target.as_str()
                }
            });

        let direction: ScrollDirection = match direction_str.parse() {
            Ok(direction) => direction,
            Err(()) => {
                // 不正な方向は検証エラーであり Capability の失敗ではない
                return Ok(ActionResult::fail(
                    Action::Scroll,
                    format!("Invalid scroll direction: {direction_str}"),
                ));
            }
        };

        let amount = intent.param_i64("amount").unwrap_or(3);
        let success = self.vision.scroll_screen(direction, amount).await?;
        Ok(ActionResult {
            success,
            response: if success {
                text_or(&intent.response, format!("Scrolling {direction}"))
            } else {
                "Failed to scroll".to_string()
            },
            ..ActionResult::ok(
                Action::Scroll,
                "",
                json!({"direction": direction.to_string(), "amount": amount}),
            )
        })
    }

    /// OPEN_FILE: 検索 → 先頭ヒットを開く。数字だけのターゲットは拒否する。
    async fn open_file(&self, intent: &Intent) -> Result<ActionResult, JarvisError> {
        let target = intent.target.as_str();

        if !target.is_empty() && target.chars().all(|c| c.is_ascii_digit()) {
            // 過去の検索結果の番号参照はステートレスな 1 リクエストでは解決できない
            return Ok(ActionResult::fail(
                Action::OpenFile,
                "Cannot open a file by result index",
            ));
        }

        let hits = self.files.search_files(target, None, 10).await?;
        match hits.first() {
            Some(hit) => {
                let success = self.system.open_file(&hit.path).await?;
                Ok(ActionResult {
                    success,
                    response: format!("Opening {}", hit.name),
                    ..ActionResult::ok(Action::OpenFile, "", json!({"file": hit}))
                })
            }
            None => Ok(ActionResult::fail(Action::OpenFile, "File not found")),
        }
    }

    /// SCREEN_CLICK: ネストした Vision サブコールの結果で常にゲートする。
    ///
    /// action が CLICK で、座標が両方あり、確信度が medium 以上のときのみ
    /// クリックする。条件を満たさなければ構造化失敗を返し、
    /// 盲目的なクリックは決して行わない。
    async fn screen_click(&self, original_command: &str) -> Result<ActionResult, JarvisError> {
        let analysis = self.vision.analyze_screen(original_command).await?;

        if analysis.action == VisionAction::Click {
            let position = analysis
                .approximate_position
                .and_then(|pos| Some((pos.x?, pos.y?)));

            if let Some((x, y)) = position {
                if analysis.confidence >= Confidence::Medium {
                    let success = self.vision.click_position(x, y).await?;
                    return Ok(ActionResult {
                        success,
                        response: text_or(&analysis.response, "Clicked".to_string()),
                        ..ActionResult::ok(
                            Action::ScreenClick,
                            "",
                            json!({
                                "position": {"x": x, "y": y},
                                "confidence": analysis.confidence,
                            }),
                        )
                    });
                }

                info!(confidence = ?analysis.confidence, "Click target found but confidence too low");
                return Ok(ActionResult::fail(
                    Action::ScreenClick,
                    "Found a target but confidence is too low to click",
                ));
            }
        }

        Ok(ActionResult::fail(
            Action::ScreenClick,
            "Couldn't identify click target",
        ))
    }

    /// SYSTEM_COMMAND: 破壊的コマンドを Capability 呼び出し前に拒否する。
    ///
    /// この拒否リストは Sanitizer の汎用チェックとは独立した追加の防壁。
    async fn system_command(&self, intent: &Intent) -> Result<ActionResult, JarvisError> {
        let target = intent.target.as_str();
        let lower = target.to_lowercase();

        if let Some(blocked) = BLOCKED_COMMAND_PATTERNS
            .iter()
            .find(|pattern| lower.contains(*pattern))
        {
            warn!(command = %target, pattern = %blocked, "Command blocked for safety");
            return Ok(ActionResult::fail_with(
                Action::SystemCommand,
                format!("Command blocked for safety: {target}"),
                json!({"blocked": true}),
            ));
        }

        let success = self.system.execute_system_command(target).await?;
        Ok(ActionResult {
            success,
            response: if success {
                text_or(&intent.response, "Command executed".to_string())
            } else {
                "System command failed".to_string()
            },
            ..ActionResult::ok(Action::SystemCommand, "", json!({"command": target}))
        })
    }
}
