use colored::{ColoredString, Colorize};
use hostdeck_cloud::{
    AccountStore, FactoryRegistry, InstanceStatus, SshSessionRegistry, SyncEngine, TrackOutcome,
};
use hostdeck_cloud_sakura::{PROVIDER as SAKURA, SakuraAgentFactory};
use hostdeck_config::Settings;
use std::sync::Arc;

/// 設定を読み込み、エンジンを起動する
pub async fn open_engine() -> anyhow::Result<SyncEngine> {
    let settings = Settings::load()?;
    let accounts_path = settings.accounts_path()?;
    tracing::debug!("Accounts file: {}", accounts_path.display());

    let factories =
        FactoryRegistry::new().with(SAKURA, Arc::new(SakuraAgentFactory::default()));

    let engine = SyncEngine::new(
        factories,
        Arc::new(AccountStore::new(accounts_path)),
        Arc::new(SshSessionRegistry::new()),
        settings.tracker_config(),
    );
    engine.bootstrap().await?;
    Ok(engine)
}

pub fn colored_status(status: &InstanceStatus) -> ColoredString {
    let text = status.to_string();
    match status {
        InstanceStatus::Running => text.green(),
        InstanceStatus::Stopped => text.red(),
        InstanceStatus::Other(_) => text.dimmed(),
        _ => text.yellow(),
    }
}

/// 追跡結果を表示
pub fn print_outcome(target: &str, outcome: &TrackOutcome) {
    match outcome {
        TrackOutcome::Confirmed(status) => println!(
            "{}",
            format!("✓ {} は {} になりました", target, status).green().bold()
        ),
        TrackOutcome::NotFound => {
            println!("{}", format!("✓ {} は削除されました", target).green().bold())
        }
        TrackOutcome::TimedOut { .. } | TrackOutcome::Aborted(_) => {
            println!("{}", format!("⚠ {}: {}", target, outcome).yellow())
        }
        TrackOutcome::Cancelled => {
            println!("{}", format!("ℹ {} の追跡は中断されました", target).dimmed())
        }
    }
}
