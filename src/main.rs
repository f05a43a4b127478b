//! 宿主命令行入口
//!
//! 简易桥接宿主：stdin 每行一条入站 URI，回调 URI 打到 stdout。
//! 审批界面用自动批准实现，真实宿主应换成自己的界面。

use anyhow::Result;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use corevault::config::Config;
use corevault::infrastructure::logging;
use corevault::service::approval::{AutoApproveSurface, SurfaceRegistry};
use corevault::VaultState;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config_path = std::env::args().nth(1);
    let config = Config::from_env_and_file(config_path.as_deref())?;

    logging::init_logging(&config.logging.level, &config.logging.format)?;

    let surfaces = SurfaceRegistry::uniform(Arc::new(AutoApproveSurface {
        default_account: None,
    }));

    let (state, mut callbacks) = VaultState::build(config, surfaces).await?;
    tracing::info!(
        chains = state.registry.list_all().len(),
        wallets = state.store.all().await.len(),
        "CoreVault ready"
    );

    // 回调直接打到 stdout，宿主负责真正打开
    let printer = tokio::spawn(async move {
        while let Some(uri) = callbacks.recv().await {
            println!("{uri}");
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match state.arbiter.handle_incoming(line).await {
            Ok(true) => {}
            Ok(false) => tracing::debug!("Ignored foreign scheme"),
            Err(e) => tracing::warn!("Dropped bad request: {e}"),
        }
    }

    state.shutdown();
    // 留一点时间把取消回调冲出去
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    printer.abort();
    Ok(())
}
