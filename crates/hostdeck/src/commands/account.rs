use colored::Colorize;
use hostdeck_cloud::{Account, AccountId, Credentials, SyncEngine};

pub struct AddOptions {
    pub provider: String,
    pub name: String,
    pub token: String,
    pub secret: Option<String>,
    pub zone: Option<String>,
    pub email: Option<String>,
}

pub async fn handle_add(engine: &SyncEngine, options: AddOptions) -> anyhow::Result<()> {
    println!(
        "{}",
        format!("アカウント '{}' を認証中...", options.name).blue()
    );

    let mut account = Account::new(
        options.provider,
        options.name,
        Credentials::new(options.token, options.secret),
    );
    if let Some(zone) = options.zone {
        account = account.with_region(zone);
    }
    if let Some(email) = options.email {
        account = account.with_email(email);
    }

    let id = engine.add_account(account).await?;

    println!();
    println!("{}", "✓ アカウントを追加しました".green().bold());
    println!("  ID: {}", id.to_string().cyan());
    Ok(())
}

pub fn handle_list(engine: &SyncEngine) {
    let accounts = engine.accounts();

    if accounts.is_empty() {
        println!("{}", "登録されたアカウントはありません".dimmed());
        println!(
            "  {}",
            "hostdeck account add --provider sakura ... で追加できます".dimmed()
        );
        return;
    }

    println!(
        "{}",
        format!(
            "{:<28} {:<10} {:<20} {:<10} {:<12}",
            "ID", "PROVIDER", "NAME", "REGION", "BALANCE"
        )
        .bold()
    );
    println!("{}", "─".repeat(84).dimmed());

    for account in accounts {
        let registered = engine.agent(&account.id).is_ok();
        let id = if registered {
            account.id.to_string().cyan()
        } else {
            account.id.to_string().red()
        };
        let region = account.settings.default_region.as_deref().unwrap_or("-");
        let balance = account
            .billing
            .as_ref()
            .map(|b| format!("{:.0} {}", b.balance, b.currency))
            .unwrap_or_else(|| "-".to_string());

        println!(
            "{:<28} {:<10} {:<20} {:<10} {:<12}",
            id,
            account.provider,
            account.display_name,
            region,
            balance.dimmed()
        );
    }
}

pub async fn handle_remove(engine: &SyncEngine, id: &str) -> anyhow::Result<()> {
    let id = AccountId::from(id);
    println!("{}", format!("アカウント '{}' を削除中...", id).yellow());

    let removed = engine.remove_account(&id).await?;

    println!();
    println!(
        "{}",
        format!("✓ アカウントと {} 台のサーバー情報を削除しました", removed)
            .green()
            .bold()
    );
    Ok(())
}

pub async fn handle_refresh(engine: &SyncEngine, id: &str) -> anyhow::Result<()> {
    let id = AccountId::from(id);
    println!("{}", format!("アカウント '{}' の情報を更新中...", id).blue());

    let account = engine.refresh_account_details(&id).await?;

    println!();
    match &account.billing {
        Some(billing) => println!(
            "残高: {} {}  (未確定: {} {})",
            format!("{:.0}", billing.balance).cyan(),
            billing.currency,
            billing.pending_charges,
            billing.currency
        ),
        None => println!("{}", "残高情報はありません".dimmed()),
    }

    if account.ssh_keys.is_empty() {
        println!("{}", "SSH鍵は登録されていません".dimmed());
    } else {
        println!("SSH鍵:");
        for key in &account.ssh_keys {
            println!("  {} {}", key.id.cyan(), key.name);
        }
    }
    Ok(())
}
