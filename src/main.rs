use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use vu_bomb_engine::core::console::{show_summary_table, ConsoleReporter};
use vu_bomb_engine::core::headers::StaticHeaders;
use vu_bomb_engine::core::transport::ReqwestTransport;
use vu_bomb_engine::models::args::Args;
use vu_bomb_engine::LoadTest;

// 阈值未通过
const EXIT_THRESHOLDS_FAILED: u8 = 99;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(EXIT_THRESHOLDS_FAILED),
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<bool> {
    let config = args.to_config().context("读取配置失败")?;
    let transport = Arc::new(ReqwestTransport::with_redirect_limit(config.max_redirects)?);
    let headers = Arc::new(StaticHeaders::from_config(&config)?);
    let reporter = Arc::new(ConsoleReporter::new(!args.no_progress));
    let test = LoadTest::from_config(config, transport, headers, reporter)?;

    let stop = test.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("收到 Ctrl-C，等待进行中的请求完成后结束");
            stop.stop();
        }
    });

    let summary = test.run().await?;
    show_summary_table(&summary);
    if let Some(path) = &args.summary_json {
        let json = summary.to_json()?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("写入 {} 失败", path.display()))?;
    }
    Ok(summary.passed())
}
