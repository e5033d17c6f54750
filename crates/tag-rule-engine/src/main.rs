//! 事件标签规则引擎运行器
//!
//! 从 stdin 逐行读取 JSON 事件，输出附加 `tags` 的事件到 stdout。

use anyhow::Result;
use rule_engine::{JsonFileRuleRepository, RuleEngine, TagResult};
use serde_json::Value;
use tagger_shared::config::AppConfig;
use tagger_shared::observability;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tracing::{error, info, warn};

const SERVICE_NAME: &str = "tag-rule-engine";

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load(SERVICE_NAME).unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {}", e);
        AppConfig::default()
    });

    let obs_config = config
        .observability
        .clone()
        .with_service_name(SERVICE_NAME);
    observability::init(&obs_config)?;

    info!("Starting tag-rule-engine...");

    let engine = RuleEngine::new();

    if let Some(path) = &config.rules.path {
        let repository = JsonFileRuleRepository::new(path);
        match engine.load_from(&repository) {
            Ok(count) => info!("Loaded {} rules from {}", count, path),
            Err(e) => warn!("Failed to load rules from {}: {}, starting with empty store", path, e),
        }
    } else {
        warn!("No rules.path configured, starting with empty store");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let mut processed = 0u64;
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    info!("Input closed");
                    break;
                };

                let degrade_on_error = config.processing.degrade_on_error;
                if let Some(output) = handle_line(&engine, &line, degrade_on_error) {
                    stdout.write_all(output.as_bytes()).await?;
                    stdout.write_all(b"\n").await?;
                    stdout.flush().await?;
                    processed += 1;
                }
            }
            _ = &mut shutdown => break,
        }
    }

    info!(processed, "Service shutdown complete");
    Ok(())
}

/// 处理单行输入，返回要输出的一行 JSON；跳过的事件返回 None
fn handle_line(engine: &RuleEngine, line: &str, degrade_on_error: bool) -> Option<String> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let event: Value = match serde_json::from_str(line) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "Skipping malformed event");
            return None;
        }
    };

    let tagged = match engine.process_value(&event) {
        Ok(tagged) => tagged,
        Err(e) if degrade_on_error && e.is_evaluation_error() => {
            warn!(error = %e, "Rule evaluation failed, emitting event without tags");
            let object = event.as_object()?;
            Value::Object(RuleEngine::annotate(object, &TagResult::default()).ok()?)
        }
        Err(e) => {
            error!(error = %e, code = e.code(), "Dropping event");
            return None;
        }
    };

    match serde_json::to_string(&tagged) {
        Ok(output) => Some(output),
        Err(e) => {
            error!(error = %e, "Failed to serialize tagged event");
            None
        }
    }
}

/// 优雅关闭信号处理
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        }
    }
}
