use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use super::color::{red, white};

/// Jarvis が発話するときに使う共通関数。
/// 先頭に 🤵 絵文字を付与し、白色テキストで表示する。
pub fn jarvis_talk(message: &str) {
    println!("🤵 {}", white(message));
}

/// Jarvis がエラーを報告するときに使う共通関数。
pub fn jarvis_report_error(message: &str) {
    eprintln!("🤵 {}", red(message));
}

/// LLM 処理中に表示するスピナーを生成・開始する。
/// 呼び出し元で `finish_and_clear()` を呼んでスピナーを停止すること。
pub fn jarvis_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("🤵 {spinner}")
            .expect("Invalid spinner template"),
    );
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}
