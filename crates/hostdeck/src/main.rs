mod commands;
mod utils;

use clap::{Parser, Subcommand};
use hostdeck_cloud::{DeployRequest, InstanceCommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hostdeck")]
#[command(about = "借りているサーバーを、ひとつのデッキで。", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// アカウントを管理
    #[command(subcommand)]
    Account(AccountCommands),
    /// サーバーの一覧を最新化して表示
    Ls {
        /// アカウントID（省略時は全アカウント）
        #[arg(short, long)]
        account: Option<String>,
    },
    /// サーバーを起動
    Start {
        /// サーバーID (provider:id)
        id: String,
        /// 起動完了まで待つ
        #[arg(short, long)]
        wait: bool,
    },
    /// サーバーを停止
    Stop {
        /// サーバーID (provider:id)
        id: String,
        /// 停止完了まで待つ
        #[arg(short, long)]
        wait: bool,
    },
    /// サーバーを再起動
    Restart {
        /// サーバーID (provider:id)
        id: String,
        /// 再起動完了まで待つ
        #[arg(short, long)]
        wait: bool,
    },
    /// サーバーを削除（⚠️ ディスクも削除されます）
    Destroy {
        /// サーバーID (provider:id)
        id: String,
        /// 削除完了まで待つ
        #[arg(short, long)]
        wait: bool,
    },
    /// OSを再インストール
    Reinstall {
        /// サーバーID (provider:id)
        id: String,
        /// 完了まで待つ
        #[arg(short, long)]
        wait: bool,
    },
    /// 新しいサーバーを作成
    Deploy {
        /// アカウントID
        #[arg(short, long)]
        account: String,
        /// サーバー名
        #[arg(short, long)]
        name: String,
        /// プラン（例: 2core-4gb）
        #[arg(long)]
        plan: Option<String>,
        /// OSイメージ
        #[arg(long)]
        image: Option<String>,
        /// リージョン / ゾーン（さくらはアカウントのゾーンのみ）
        #[arg(long)]
        region: Option<String>,
        /// 登録するSSH鍵ID（複数指定可）
        #[arg(long = "ssh-key")]
        ssh_keys: Vec<String>,
        /// 起動完了まで待つ
        #[arg(short, long)]
        wait: bool,
    },
    /// バージョン情報を表示
    Version,
}

/// アカウント管理のサブコマンド
#[derive(Subcommand)]
enum AccountCommands {
    /// アカウントを追加（認証に成功した場合のみ保存）
    Add {
        /// プロバイダー (sakura)
        #[arg(short, long, default_value = "sakura")]
        provider: String,
        /// 表示名
        #[arg(short, long)]
        name: String,
        /// APIトークン
        #[arg(long, env = "HOSTDECK_TOKEN")]
        token: String,
        /// APIシークレット
        #[arg(long, env = "HOSTDECK_SECRET")]
        secret: Option<String>,
        /// デフォルトのゾーン / リージョン
        #[arg(long)]
        zone: Option<String>,
        /// 連絡先メールアドレス
        #[arg(long)]
        email: Option<String>,
    },
    /// アカウントの一覧を表示
    List,
    /// アカウントと、そのサーバー情報を削除
    Remove {
        /// アカウントID
        id: String,
    },
    /// 残高とSSH鍵の情報を更新
    Refresh {
        /// アカウントID
        id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ログはstderrに出力（RUST_LOG未指定時は info）
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Versionコマンドは設定ファイル不要
    if matches!(cli.command, Commands::Version) {
        println!("hostdeck {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let engine = utils::open_engine().await?;

    let result = match cli.command {
        Commands::Account(account_cmd) => match account_cmd {
            AccountCommands::Add {
                provider,
                name,
                token,
                secret,
                zone,
                email,
            } => {
                commands::account::handle_add(
                    &engine,
                    commands::account::AddOptions {
                        provider,
                        name,
                        token,
                        secret,
                        zone,
                        email,
                    },
                )
                .await
            }
            AccountCommands::List => {
                commands::account::handle_list(&engine);
                Ok(())
            }
            AccountCommands::Remove { id } => commands::account::handle_remove(&engine, &id).await,
            AccountCommands::Refresh { id } => {
                commands::account::handle_refresh(&engine, &id).await
            }
        },
        Commands::Ls { account } => commands::ls::handle(&engine, account).await,
        Commands::Start { id, wait } => {
            commands::instance::handle(&engine, &id, InstanceCommand::Start, wait).await
        }
        Commands::Stop { id, wait } => {
            commands::instance::handle(&engine, &id, InstanceCommand::Stop, wait).await
        }
        Commands::Restart { id, wait } => {
            commands::instance::handle(&engine, &id, InstanceCommand::Restart, wait).await
        }
        Commands::Destroy { id, wait } => {
            commands::instance::handle(&engine, &id, InstanceCommand::Destroy, wait).await
        }
        Commands::Reinstall { id, wait } => {
            commands::instance::handle(&engine, &id, InstanceCommand::Reinstall, wait).await
        }
        Commands::Deploy {
            account,
            name,
            plan,
            image,
            region,
            ssh_keys,
            wait,
        } => {
            let request = DeployRequest {
                plan,
                image,
                region,
                ssh_key_ids: ssh_keys,
                ..DeployRequest::new(name)
            };
            commands::deploy::handle(&engine, &account, request, wait).await
        }
        Commands::Version => Ok(()),
    };

    engine.shutdown();
    result
}
