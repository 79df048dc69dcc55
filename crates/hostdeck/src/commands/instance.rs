use crate::utils;
use colored::Colorize;
use hostdeck_cloud::{InstanceCommand, InstanceId, SyncEngine};

fn progress(command: InstanceCommand) -> &'static str {
    match command {
        InstanceCommand::Start => "起動",
        InstanceCommand::Stop => "停止",
        InstanceCommand::Restart => "再起動",
        InstanceCommand::Destroy => "削除",
        InstanceCommand::Reinstall => "再インストール",
    }
}

pub async fn handle(
    engine: &SyncEngine,
    id: &str,
    command: InstanceCommand,
    wait: bool,
) -> anyhow::Result<()> {
    let id = InstanceId::from(id);
    println!(
        "{}",
        format!("サーバー '{}' を{}中...", id, progress(command)).yellow()
    );

    // ルーティングはストアの所有者情報を使うので、先に最新化する
    engine.refresh_all().await?;

    let label = engine
        .instance(&id)
        .map(|i| format!("{} ({})", i.name, id))
        .unwrap_or_else(|| id.to_string());

    if wait {
        let outcome = engine.execute_and_wait(&id, command).await?;
        println!();
        utils::print_outcome(&label, &outcome);
    } else {
        engine.execute(&id, command).await?;
        println!();
        println!(
            "{}",
            format!("✓ {} の{}を受け付けました", label, progress(command))
                .green()
                .bold()
        );
        println!(
            "  {}",
            "完了を待つには --wait を指定してください".dimmed()
        );
    }

    Ok(())
}
