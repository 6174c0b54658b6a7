//! # Blobgate CLI
//!
//! 稼働中のGatewayに対する一覧取得・アップロード・ダウンロードと、
//! ローカルのURLキャッシュファイルの管理を行う。

mod client;
mod commands;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::client::GatewayClient;

/// 全サブコマンド共通の引数。
#[derive(Debug, Args)]
struct GlobalArgs {
    /// GatewayのベースURL
    #[arg(
        global = true,
        long,
        env = "BLOBGATE_URL",
        default_value = "http://localhost:8080"
    )]
    gateway: String,

    /// ログの詳細度（-v: debug, -vv: trace）
    #[arg(global = true, short = 'v', action = clap::ArgAction::Count)]
    verbosity: u8,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// オブジェクト一覧（署名付きURL付き）を表示する
    Files {
        /// JSONで出力する
        #[arg(long)]
        json: bool,
    },
    /// ファイルをアップロードする
    Upload {
        /// アップロードするファイル
        path: PathBuf,
        /// オブジェクト名（省略時はファイル名）
        #[arg(long)]
        name: Option<String>,
        /// MIMEタイプ
        #[arg(long, default_value = "application/octet-stream")]
        content_type: String,
    },
    /// オブジェクトをダウンロードする
    Download {
        /// オブジェクト名
        name: String,
        /// 出力先（省略時は標準出力）
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// 再開可能アップロードのセッションURIを発行する
    Resumable,
    /// ローカルのURLキャッシュファイルを操作する
    Cache(CacheArgs),
}

#[derive(Debug, Args)]
struct CacheArgs {
    /// キャッシュファイルのパス
    #[arg(long, env = "URL_CACHE_PATH", default_value = "./filename-to-url.jsonl")]
    path: PathBuf,

    #[command(subcommand)]
    command: CacheCommand,
}

#[derive(Debug, Subcommand)]
enum CacheCommand {
    /// 全エントリを表示する
    List,
    /// 全エントリを削除する
    Purge,
}

#[derive(Debug, Parser)]
#[command(name = "blobgate-cli")]
#[command(about = "Blobgate Gateway CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    #[command(flatten)]
    global_args: GlobalArgs,
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.global_args.verbosity);
    let client = GatewayClient::new(&cli.global_args.gateway);

    match cli.command {
        Commands::Files { json } => commands::files(&client, json).await?,
        Commands::Upload {
            path,
            name,
            content_type,
        } => {
            let name = commands::upload(&client, &path, name, &content_type).await?;
            println!("{name}");
        }
        Commands::Download { name, output } => {
            let written = match output {
                Some(path) => {
                    let mut file = tokio::fs::File::create(&path).await?;
                    commands::download(&client, &name, &mut file).await?
                }
                None => commands::download(&client, &name, &mut tokio::io::stdout()).await?,
            };
            tracing::info!(object = %name, bytes = written, "ダウンロード完了");
        }
        Commands::Resumable => commands::resumable(&client).await?,
        Commands::Cache(args) => match args.command {
            CacheCommand::List => {
                for (key, value) in commands::cache_list(&args.path).await? {
                    println!("{key}\t{value}");
                }
            }
            CacheCommand::Purge => {
                let removed = commands::cache_purge(&args.path).await?;
                println!("{removed}件のエントリを削除しました");
            }
        },
    }

    Ok(())
}
