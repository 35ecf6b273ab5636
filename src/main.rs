mod actions;
mod ai;
mod api;
mod capabilities;
mod cli;
mod config;
mod error;
mod logging;
mod pipeline;
mod security;

use std::collections::VecDeque;
use std::io::{BufRead, Write};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use ai::{Brain, JarvisBrain};
use api::{CommandRequest, ErrorEnvelope};
use capabilities::apps::AppIndex;
use capabilities::desktop::{
    DesktopFiles, DesktopMedia, DesktopSystem, NullSpeech, UnsupportedVision,
};
use capabilities::{FileSearch, SpeechOutput, SystemControl};
use cli::jarvis::{jarvis_report_error, jarvis_spinner, jarvis_talk};
use config::JarvisConfig;
use error::StatusClass;
use pipeline::JarvisPipeline;

/// AI Desktop Assistant Backend inspired by J.A.R.V.I.S.
#[derive(Debug, Parser)]
#[command(name = "jarvisd", version, about)]
struct Args {
    /// 実行する自然言語コマンド（ワンショットモード）
    command: Vec<String>,

    /// 標準入力からコマンドを読み続ける
    #[arg(short, long)]
    interactive: bool,

    /// 解釈のみ行い、アクションは実行しない
    #[arg(long)]
    interpret_only: bool,

    /// 部分入力に対するコマンドサジェストを表示する
    #[arg(long)]
    suggest: bool,

    /// エンベロープを JSON で出力する
    #[arg(long)]
    json: bool,

    /// レート制限に使う呼び出し元識別子
    #[arg(long)]
    user: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env ファイルから環境変数を読み込む
    dotenvy::dotenv().ok();

    // ログシステムの初期化（_guard は main 終了まで保持する必要がある）
    let _guard = logging::init_logging();
    info!("jarvisd started");

    let args = Args::parse();
    let config = JarvisConfig::load();

    let brain: Arc<dyn Brain> = Arc::new(
        JarvisBrain::new(&config.llm).context("failed to initialize the AI brain")?,
    );

    // Capability プロバイダの配線
    let apps = Arc::new(AppIndex::new());
    let files: Arc<dyn FileSearch> = Arc::new(DesktopFiles::new(&config.search));
    let system: Arc<dyn SystemControl> =
        Arc::new(DesktopSystem::new(apps, Arc::clone(&files)));
    let speech: Option<Arc<dyn SpeechOutput>> = if config.voice.enabled {
        Some(Arc::new(NullSpeech))
    } else {
        None
    };

    let dispatcher = actions::Dispatcher::new(
        Arc::clone(&system),
        Arc::new(UnsupportedVision),
        Arc::new(DesktopMedia),
        files,
        Arc::clone(&brain),
    );
    let pipeline = JarvisPipeline::new(&config, brain, dispatcher, system, speech);

    if args.interactive {
        run_interactive(&pipeline, &args).await;
        info!("jarvisd shutting down");
        return Ok(());
    }

    let command = args.command.join(" ");
    if command.trim().is_empty() {
        anyhow::bail!("no command given (try: jarvisd \"open chrome\", or --interactive)");
    }

    if args.suggest {
        for suggestion in JarvisPipeline::suggestions(&command) {
            println!("{suggestion}");
        }
        return Ok(());
    }

    let code = run_once(&pipeline, &args, &command, &[]).await;
    info!(exit_code = code, "jarvisd shutting down");
    // process::exit はデストラクタを呼ばないため、ログガードを先に落とす
    drop(_guard);
    std::process::exit(code);
}

/// 1 コマンドを処理して終了コードを返す。
async fn run_once(
    pipeline: &JarvisPipeline,
    args: &Args,
    command: &str,
    last_actions: &[String],
) -> i32 {
    let mut request = CommandRequest::new(command);
    request.user_id = args.user.clone();
    request.last_actions = last_actions.to_vec();

    let spinner = jarvis_spinner();

    if args.interpret_only {
        let result = pipeline.interpret_only(&request).await;
        spinner.finish_and_clear();
        return match result {
            Ok(report) => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&report)
                        .unwrap_or_else(|e| format!("{{\"serialization_error\": \"{e}\"}}"))
                );
                0
            }
            Err(e) => report_error(args, &e),
        };
    }

    let result = pipeline.execute(&request).await;
    spinner.finish_and_clear();

    match result {
        Ok(response) => {
            if args.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&response)
                        .unwrap_or_else(|e| format!("{{\"serialization_error\": \"{e}\"}}"))
                );
            } else {
                jarvis_talk(&response.data.response);
                let marker = if response.data.success {
                    cli::color::green("ok")
                } else {
                    cli::color::red("failed")
                };
                println!(
                    "   {} {} ({:.2}s)",
                    cli::color::cyan(&format!("[{}]", response.data.action)),
                    marker,
                    response.data.execution_time,
                );
            }
            0
        }
        Err(e) => report_error(args, &e),
    }
}

/// エラーエンベロープを表示して終了コードを返す。
fn report_error(args: &Args, error: &error::JarvisError) -> i32 {
    warn!(error_code = error.error_code(), error = %error, "Request failed");

    if args.json {
        let envelope = ErrorEnvelope::from(error);
        eprintln!(
            "{}",
            serde_json::to_string_pretty(&envelope)
                .unwrap_or_else(|e| format!("{{\"serialization_error\": \"{e}\"}}"))
        );
    } else {
        jarvis_report_error(&format!("{} ({})", error, error.error_code()));
    }

    match error.status_class() {
        StatusClass::ClientError => 2,
        StatusClass::ServerError => 1,
    }
}

/// 標準入力からコマンドを読み続ける対話モード。
async fn run_interactive(pipeline: &JarvisPipeline, args: &Args) {
    jarvis_talk("At your service, sir. Type a command, or \"exit\" to quit.");

    // 直近の実行アクションを会話コンテキストとして保持する
    let mut last_actions: VecDeque<String> = VecDeque::with_capacity(5);

    let stdin = std::io::stdin();
    loop {
        print!("> ");
        let _ = std::io::stdout().flush();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "Failed to read stdin, exiting");
                break;
            }
        }

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }

        let mut request = CommandRequest::new(line);
        request.user_id = args.user.clone();
        request.last_actions = last_actions.iter().cloned().collect();

        let spinner = jarvis_spinner();
        let result = pipeline.execute(&request).await;
        spinner.finish_and_clear();

        match result {
            Ok(response) => {
                jarvis_talk(&response.data.response);
                if last_actions.len() == 5 {
                    last_actions.pop_front();
                }
                last_actions.push_back(response.data.action.clone());
            }
            Err(e) => {
                report_error(args, &e);
            }
        }
    }

    jarvis_talk("Goodbye, sir.");
}
