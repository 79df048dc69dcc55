use crate::utils;
use colored::Colorize;
use hostdeck_cloud::{AccountId, DeployRequest, SyncEngine};

pub async fn handle(
    engine: &SyncEngine,
    account: &str,
    request: DeployRequest,
    wait: bool,
) -> anyhow::Result<()> {
    let account = AccountId::from(account);
    println!(
        "{}",
        format!("サーバー '{}' を作成中...", request.name).blue()
    );
    println!("アカウント: {}", account.to_string().cyan());
    if let Some(plan) = &request.plan {
        println!("プラン: {}", plan.cyan());
    }

    // 追跡結果を取りこぼさないよう、デプロイ前に購読する
    let mut events = engine.subscribe();
    let id = engine.deploy(&account, &request).await?;

    println!();
    println!(
        "{}",
        format!("✓ デプロイを受け付けました: {}", id).green().bold()
    );

    if wait {
        if !engine.tracker().is_tracking(&id) {
            println!(
                "{}",
                "ℹ サーバーはまだ一覧に現れていません。hostdeck ls で確認してください".dimmed()
            );
            return Ok(());
        }
        println!("{}", "起動完了を待っています...".dimmed());
        loop {
            match events.recv().await {
                Ok(event) if event.instance_id == id => {
                    utils::print_outcome(&request.name, &event.outcome);
                    break;
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    Ok(())
}
