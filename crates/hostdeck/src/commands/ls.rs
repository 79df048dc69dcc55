use crate::utils;
use colored::Colorize;
use hostdeck_cloud::{AccountId, SyncEngine};

pub async fn handle(engine: &SyncEngine, account: Option<String>) -> anyhow::Result<()> {
    println!("{}", "サーバー一覧を取得中...".blue());

    let instances = match account {
        Some(account) => {
            let id = AccountId::from(account);
            println!("アカウント: {}", id.to_string().cyan());
            let report = engine.refresh_account(&id).await?;
            tracing::debug!("{}", report.plan.summary());
            engine.store().by_account(&id)
        }
        None => {
            let report = engine.refresh_all().await?;
            tracing::debug!("{}", report.plan.summary());
            engine.instances()
        }
    };

    println!();
    if instances.is_empty() {
        println!("{}", "サーバーはありません".dimmed());
        return Ok(());
    }

    println!(
        "{}",
        format!(
            "{:<32} {:<20} {:<12} {:<16} {:<8} {:<12}",
            "ID", "NAME", "STATUS", "IPV4", "REGION", "PLAN"
        )
        .bold()
    );
    println!("{}", "─".repeat(105).dimmed());

    for instance in instances {
        println!(
            "{:<32} {:<20} {:<12} {:<16} {:<8} {:<12}",
            instance.id.to_string().cyan(),
            instance.name,
            utils::colored_status(&instance.status),
            instance.ipv4.as_deref().unwrap_or("-"),
            instance.location.as_deref().unwrap_or("-"),
            instance.plan.as_deref().unwrap_or("-").dimmed()
        );
    }

    Ok(())
}
