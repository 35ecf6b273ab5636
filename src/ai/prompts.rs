//! システムプロンプトと定数
//!
//! 解釈・画面解析・会話・URL 構築の 4 つのプロンプト契約を定義する。
//! アクションタクソノミと YouTube の曖昧性解消ルールはここが唯一の定義点。

use super::types::CommandContext;

/// プロンプトに埋め込む検出済みアプリ名の上限
pub const MAX_PROMPT_APPS: usize = 50;

/// 会話プロンプトに載せる直近アクションの上限
pub const MAX_CONTEXT_ACTIONS: usize = 3;

/// コマンド解釈プロンプトを組み立てる。
///
/// アクションタクソノミ・JSON スキーマ・OS 種別・検出済みアプリ（先頭 50 件）を
/// 埋め込み、生のコマンドテキストを末尾に付ける。
/// YouTube ルール: play/watch/listen → PLAY_YOUTUBE、明示的な "search" →
/// SEARCH_YOUTUBE、YouTube ホームを開く → OPEN_WEBSITE (target "youtube")。
pub fn interpretation_prompt(command: &str, context: &CommandContext) -> String {
    let apps_text = if context.detected_apps.is_empty() {
        "Scanning...".to_string()
    } else {
        context
            .detected_apps
            .iter()
            .take(MAX_PROMPT_APPS)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    };

    format!(
        r#"You are Jarvis with COMPLETE system control capabilities.

CRITICAL: Respond with VALID JSON only. No markdown, no extra text.

Available Actions:
1. OPEN_APP - Open application
2. OPEN_FOLDER - Open folder
3. SEARCH_WEB - Google search
4. SEARCH_YOUTUBE - YouTube search (search only)
5. PLAY_YOUTUBE - Play YouTube video directly
6. OPEN_WEBSITE - Open website (for specific sites)
7. SCREEN_CLICK - Click on screen
8. SCREEN_ANALYZE - Analyze screen
9. TYPE_TEXT - Type text
10. PRESS_KEY - Press key/combination
11. SCROLL - Scroll up/down
12. SEARCH_FILES - Search files/folders
13. OPEN_FILE - Open specific file/folder
14. CONVERSATION - General chat
15. SYSTEM_COMMAND - Execute command

System: {os_type}
Detected Apps: {apps_text}

JSON Format:
{{
    "action": "ACTION_TYPE",
    "target": "target/query",
    "reasoning": "why this action",
    "executable_hints": ["possible", "executables"],
    "folder_paths": ["possible/paths"],
    "params": {{"direction": "up/down", "amount": 3, "key": "enter"}},
    "response": "user message"
}}

CRITICAL YOUTUBE RULES:
1. PLAY_YOUTUBE = When user wants to PLAY/WATCH/LISTEN
   - Keywords: "play", "watch", "listen", "put on"
   - Examples: "play despacito", "watch tutorial", "listen to music"
2. SEARCH_YOUTUBE = ONLY when user explicitly says "search"
3. OPEN_WEBSITE = When opening YouTube homepage: target should be "youtube"

Examples:
"open chrome" -> {{"action": "OPEN_APP", "target": "chrome", "response": "Opening Chrome"}}
"play despacito" -> {{"action": "PLAY_YOUTUBE", "target": "despacito", "response": "Playing despacito"}}
"open youtube" -> {{"action": "OPEN_WEBSITE", "target": "youtube", "response": "Opening YouTube"}}
"scroll down" -> {{"action": "SCROLL", "target": "down", "params": {{"direction": "down", "amount": 3}}, "response": "Scrolling"}}

Now interpret: {command}"#,
        os_type = context.os_type,
    )
}

/// 画面解析プロンプトを組み立てる。
/// クリック座標はスクリーン寸法に対するパーセンテージ (0-100) で要求する。
pub fn vision_prompt(user_query: &str) -> String {
    format!(
        r#"Analyze this screenshot and help with: "{user_query}"

Respond with JSON ONLY:
{{
    "action": "CLICK" | "INFORMATION" | "NOT_FOUND",
    "target_description": "what to interact with",
    "approximate_position": {{"x": percent_x, "y": percent_y}},
    "confidence": "high" | "medium" | "low",
    "reasoning": "what you found",
    "response": "user message"
}}

For clicks: provide x,y as percentages (0-100) of screen size.
For information: describe what you see."#
    )
}

/// 会話応答プロンプトを組み立てる（スキーマ指定なし）。
pub fn conversation_prompt(message: &str, context: &CommandContext) -> String {
    let mut context_prompt = String::new();
    if !context.last_actions.is_empty() {
        let recent: Vec<&str> = context
            .last_actions
            .iter()
            .rev()
            .take(MAX_CONTEXT_ACTIONS)
            .rev()
            .map(String::as_str)
            .collect();
        context_prompt.push_str(&format!("Recent actions: {}\n", recent.join(", ")));
    }

    format!(
        r#"{context_prompt}
User message: "{message}"

Respond naturally as a helpful AI assistant. Be concise but friendly. No need for JSON formatting."#
    )
}

/// URL 構築プロンプトを組み立てる。ちょうど 1 つの https:// URL を要求する。
pub fn url_prompt(website_input: &str) -> String {
    format!(
        r#"Given the website input: "{website_input}"

Return ONLY a valid, complete URL with proper format.

Rules:
1. Return ONLY the URL, nothing else
2. Must start with https://
3. Use correct domain extension (.com, .org, .net, .io, etc.)
4. For popular sites, use the exact correct URL
5. No www duplication
6. Clean, single URL only

Examples:
Input: "youtube" -> Output: https://www.youtube.com
Input: "gmail" -> Output: https://mail.google.com
Input: "github" -> Output: https://github.com
Input: "reddit" -> Output: https://www.reddit.com

Now process: "{website_input}"

Return ONLY the URL:"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpretation_prompt_embeds_taxonomy_and_command() {
        let context = CommandContext {
            os_type: "linux".to_string(),
            detected_apps: vec!["firefox".to_string(), "code".to_string()],
            last_actions: vec![],
        };
        let prompt = interpretation_prompt("open chrome", &context);

        assert!(prompt.contains("PLAY_YOUTUBE"));
        assert!(prompt.contains("SYSTEM_COMMAND"));
        assert!(prompt.contains("System: linux"));
        assert!(prompt.contains("firefox, code"));
        assert!(prompt.ends_with("Now interpret: open chrome"));
    }

    #[test]
    fn interpretation_prompt_caps_app_list() {
        let context = CommandContext {
            os_type: "linux".to_string(),
            detected_apps: (0..200).map(|i| format!("app{i}")).collect(),
            last_actions: vec![],
        };
        let prompt = interpretation_prompt("x", &context);

        assert!(prompt.contains("app49"));
        assert!(!prompt.contains("app50,"));
        assert!(!prompt.contains("app199"));
    }

    #[test]
    fn interpretation_prompt_shows_scanning_when_no_apps() {
        let context = CommandContext {
            os_type: "macos".to_string(),
            ..CommandContext::default()
        };
        let prompt = interpretation_prompt("x", &context);
        assert!(prompt.contains("Detected Apps: Scanning..."));
    }

    #[test]
    fn conversation_prompt_includes_recent_actions_only() {
        let context = CommandContext {
            last_actions: (1..=5).map(|i| format!("action{i}")).collect(),
            ..CommandContext::default()
        };
        let prompt = conversation_prompt("hello", &context);

        // 直近 3 件のみ、古い順で載る
        assert!(prompt.contains("action3, action4, action5"));
        assert!(!prompt.contains("action1"));
    }

    #[test]
    fn url_prompt_names_the_site() {
        let prompt = url_prompt("github");
        assert!(prompt.contains("\"github\""));
        assert!(prompt.contains("https://"));
    }
}
