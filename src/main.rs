//! DevAgency 入口：初始化日志、加载配置、创建编排器并运行行式 REPL
//!
//! Ctrl+C 取消当前请求；输入 exit 退出。

use anyhow::Context;
use devagency::config::{load_config, AppConfig};
use devagency::core::Orchestrator;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 日志：默认 info，可通过 RUST_LOG 覆盖
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let config_path = std::env::args().nth(1).map(std::path::PathBuf::from);
    let cfg = load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    let mut orchestrator =
        Orchestrator::from_config(&cfg).context("Failed to create orchestrator")?;

    let supervisor = orchestrator.supervisor();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            supervisor.cancel();
        }
    });

    let name = cfg.app.name.clone().unwrap_or_else(|| "DevAgency".to_string());
    let mut stdout = tokio::io::stdout();
    stdout
        .write_all(format!("{name} ready. Describe a project idea, or type exit.\n").as_bytes())
        .await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await.context("Failed to read input")? else {
            break;
        };
        match orchestrator.handle_line(&line).await {
            Some(text) if text.is_empty() => {}
            Some(text) => {
                stdout.write_all(text.trim_end().as_bytes()).await?;
                stdout.write_all(b"\n").await?;
            }
            None => break,
        }
    }

    orchestrator.supervisor().shutdown();
    let (prompt, completion, total) = orchestrator.token_usage();
    tracing::info!(prompt, completion, total, "token usage");
    Ok(())
}
