//! アクション実行モジュール
//!
//! Intent を Capability 呼び出しへ写像するディスパッチャと、
//! その結果を表す `ActionResult` を定義する。

pub mod dispatch;

use serde::Serialize;
use serde_json::{json, Value};

use crate::ai::Action;

pub use dispatch::Dispatcher;

/// 1 アクションの実行結果。
///
/// ディスパッチャが Capability 呼び出し（または短い固定シーケンス）の後に
/// 生成し、以降は変更されない。`execution_time` はパイプラインが
/// リクエスト全体の経過時間で上書きする。
#[derive(Debug, Clone, Serialize)]
pub struct ActionResult {
    pub success: bool,
    pub action: String,
    pub response: String,
    pub data: Value,
    pub execution_time: f64,
}

impl ActionResult {
    /// 成功結果を生成するヘルパー
    pub fn ok(action: Action, response: impl Into<String>, data: Value) -> Self {
        Self {
            success: true,
            action: action.result_name().to_string(),
            response: response.into(),
            data,
            execution_time: 0.0,
        }
    }

    /// 失敗結果を生成するヘルパー
    pub fn fail(action: Action, response: impl Into<String>) -> Self {
        Self {
            success: false,
            action: action.result_name().to_string(),
            response: response.into(),
            data: json!({}),
            execution_time: 0.0,
        }
    }

    /// データ付きの失敗結果を生成するヘルパー
    pub fn fail_with(action: Action, response: impl Into<String>, data: Value) -> Self {
        Self {
            success: false,
            action: action.result_name().to_string(),
            response: response.into(),
            data,
            execution_time: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_serializes_with_lowercase_action() {
        let result = ActionResult::ok(Action::OpenApp, "Opening Chrome", json!({"app": "chrome"}));
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["action"], "open_app");
        assert_eq!(value["success"], true);
        assert_eq!(value["data"]["app"], "chrome");
    }

    #[test]
    fn fail_has_empty_data_object() {
        let result = ActionResult::fail(Action::Scroll, "Invalid scroll direction");
        assert!(!result.success);
        assert_eq!(result.data, json!({}));
    }
}
