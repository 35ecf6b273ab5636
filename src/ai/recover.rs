//! LLM レスポンスからの構造化データ復元
//!
//! LLM は JSON を散文やコードフェンスで包んで返すことがある。
//! フェンス除去 → 波括弧スパン抽出 → スキーマデコードの二段構成で復元し、
//! 失敗しても例外を投げずに型付きのフォールバック結果へ縮退する。
//! デコード失敗が呼び出し元へハードエラーとして伝播することはない。

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::types::{Confidence, Intent, Position, VisionAction, VisionAnalysis};

/// 復元の結果。スキーマ通りにデコードできたか、フォールバックに縮退したか。
#[derive(Debug, Clone, PartialEq)]
pub enum Recovery<T> {
    /// 波括弧スパンがスキーマ通りにデコードできた
    Parsed(T),
    /// スパンが見つからない・デコード不能 → フォールバック値
    Fallback(T),
}

impl<T> Recovery<T> {
    /// 内包する値を取り出す
    pub fn into_inner(self) -> T {
        match self {
            Self::Parsed(value) | Self::Fallback(value) => value,
        }
    }

    /// フォールバックに縮退したか
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback(_))
    }
}

/// コードフェンスマーカー（```json / ```）を除去する。
pub fn strip_code_fences(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") {
            continue;
        }
        out.push_str(line);
        out.push('\n');
    }
    out.trim().to_string()
}

/// 最初のバランスした `{...}` スパンを抽出する。
///
/// JSON 文字列リテラル内の波括弧は深さに数えない（エスケープも考慮）。
/// 対応する閉じ括弧が見つからない場合は、最後の `}` までの
/// 貪欲スパンにフォールバックする。
pub fn extract_brace_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }

    // バランスしない場合は最後の閉じ括弧までを貪欲に取る
    let end = text.rfind('}')?;
    if end > start {
        Some(&text[start..=end])
    } else {
        None
    }
}

/// 汎用の二段復元。フェンス除去 → スパン抽出 → デコード。
fn recover<T: DeserializeOwned>(raw: &str) -> Option<T> {
    let stripped = strip_code_fences(raw);
    let span = extract_brace_span(&stripped)?;
    match serde_json::from_str::<T>(span) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(error = %e, span_length = span.len(), "Failed to decode extracted JSON span");
            None
        }
    }
}

/// LLM レスポンスから Intent を復元する。
///
/// 復元できない場合は `CONVERSATION` アクションと、トリムした生テキストを
/// `response` に持つフォールバック Intent を返す。
pub fn recover_intent(raw: &str) -> Recovery<Intent> {
    match recover::<Intent>(raw) {
        Some(intent) => {
            debug!(action = %intent.action, "Intent recovered from LLM response");
            Recovery::Parsed(intent)
        }
        None => {
            let stripped = strip_code_fences(raw);
            Recovery::Fallback(Intent {
                reasoning: "Parse error - treating as conversation".to_string(),
                response: stripped,
                ..Intent::default()
            })
        }
    }
}

/// Vision レスポンスから解析結果を復元する。
///
/// 復元できない場合は画面中央を指す `INFORMATION` 解析へ縮退する。
pub fn recover_vision(raw: &str) -> Recovery<VisionAnalysis> {
    match recover::<VisionAnalysis>(raw) {
        Some(analysis) => Recovery::Parsed(analysis),
        None => Recovery::Fallback(VisionAnalysis {
            action: VisionAction::Information,
            target_description: "general screen content".to_string(),
            approximate_position: Some(Position {
                x: Some(50.0),
                y: Some(50.0),
            }),
            confidence: Confidence::Medium,
            reasoning: "Could not parse structured response".to_string(),
            response: strip_code_fences(raw),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::types::Action;

    const INTENT_JSON: &str = r#"{"action": "OPEN_APP", "target": "chrome", "response": "Opening Chrome"}"#;

    // ── strip_code_fences / extract_brace_span ──

    #[test]
    fn strips_fence_markers() {
        let fenced = format!("```json\n{INTENT_JSON}\n```");
        assert_eq!(strip_code_fences(&fenced), INTENT_JSON);
    }

    #[test]
    fn extracts_balanced_span_with_nesting() {
        let text = r#"Sure! {"a": {"b": 1}} and more"#;
        assert_eq!(extract_brace_span(text), Some(r#"{"a": {"b": 1}}"#));
    }

    #[test]
    fn braces_inside_strings_do_not_break_balance() {
        let text = r#"{"response": "use {x} here"} trailing"#;
        assert_eq!(
            extract_brace_span(text),
            Some(r#"{"response": "use {x} here"}"#)
        );
    }

    #[test]
    fn first_balanced_object_wins_over_trailing_garbage() {
        let text = r#"{"a": 1} oops {"#;
        assert_eq!(extract_brace_span(text), Some(r#"{"a": 1}"#));
    }

    #[test]
    fn unbalanced_text_falls_back_to_greedy_span() {
        // 閉じ括弧が文字列内にしかない → 貪欲スパン（デコードは失敗して
        // 呼び出し元のフォールバックに縮退する）
        let text = r#"{"a": "}"#;
        assert_eq!(extract_brace_span(text), Some(r#"{"a": "}"#));
    }

    #[test]
    fn no_braces_yields_none() {
        assert_eq!(extract_brace_span("just some prose"), None);
    }

    // ── recover_intent ──

    #[test]
    fn raw_json_and_fenced_json_recover_identically() {
        let raw = recover_intent(INTENT_JSON);
        let fenced = recover_intent(&format!("```json\n{INTENT_JSON}\n```"));

        let raw = raw.into_inner();
        let fenced = fenced.into_inner();
        assert_eq!(raw.action, Action::OpenApp);
        assert_eq!(raw.action, fenced.action);
        assert_eq!(raw.target, fenced.target);
        assert_eq!(raw.response, fenced.response);
    }

    #[test]
    fn json_wrapped_in_prose_recovers() {
        let text = format!("Of course, sir. Here is the plan:\n{INTENT_JSON}\nLet me know.");
        let recovery = recover_intent(&text);
        assert!(!recovery.is_fallback());
        assert_eq!(recovery.into_inner().target, "chrome");
    }

    #[test]
    fn unrecoverable_text_falls_back_to_conversation() {
        let text = "  I'm afraid I can't structure that, sir.  ";
        let recovery = recover_intent(text);
        assert!(recovery.is_fallback());
        let intent = recovery.into_inner();
        assert_eq!(intent.action, Action::Conversation);
        assert_eq!(intent.response, "I'm afraid I can't structure that, sir.");
        assert!(intent.executable_hints.is_empty());
        assert!(intent.params.is_empty());
    }

    #[test]
    fn invalid_json_span_falls_back_to_conversation() {
        let text = r#"{"action": OPEN_APP no quotes}"#;
        let recovery = recover_intent(text);
        assert!(recovery.is_fallback());
        assert_eq!(recovery.into_inner().action, Action::Conversation);
    }

    // ── recover_vision ──

    #[test]
    fn vision_json_recovers() {
        let text = r#"```json
{"action": "CLICK", "approximate_position": {"x": 10, "y": 20}, "confidence": "high"}
```"#;
        let recovery = recover_vision(text);
        assert!(!recovery.is_fallback());
        let analysis = recovery.into_inner();
        assert_eq!(analysis.action, VisionAction::Click);
        assert_eq!(analysis.approximate_position.unwrap().x, Some(10.0));
    }

    #[test]
    fn vision_fallback_is_information_at_center() {
        let recovery = recover_vision("The screen shows a browser window.");
        assert!(recovery.is_fallback());
        let analysis = recovery.into_inner();
        assert_eq!(analysis.action, VisionAction::Information);
        assert_eq!(analysis.confidence, Confidence::Medium);
        let pos = analysis.approximate_position.unwrap();
        assert_eq!(pos.x, Some(50.0));
        assert_eq!(analysis.response, "The screen shows a browser window.");
    }
}
