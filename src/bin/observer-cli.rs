use clap::{Parser, Subcommand, ValueEnum};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "observer-cli")]
#[command(about = "Management CLI for the ledger payment observer", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, env = "OBSERVER_ADMIN_KEY", default_value = "")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Transient,
    Residential,
}

#[derive(Subcommand)]
enum Commands {
    /// Show observer health
    Health,
    /// List watched accounts
    Accounts,
    /// Start watching an account
    Register {
        account: String,
        #[arg(long, value_enum, default_value = "transient")]
        kind: Kind,
    },
    /// Stop watching an account
    Unregister { account: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let res = match cli.command {
        Commands::Health => client.get(format!("{base}/health")).send().await?,
        Commands::Accounts => {
            client
                .get(format!("{base}/accounts"))
                .headers(headers)
                .send()
                .await?
        }
        Commands::Register { account, kind } => {
            let account_type = match kind {
                Kind::Transient => "transient",
                Kind::Residential => "residential",
            };
            client
                .post(format!("{base}/accounts"))
                .headers(headers)
                .json(&json!({ "account_id": account, "account_type": account_type }))
                .send()
                .await?
        }
        Commands::Unregister { account } => {
            client
                .delete(format!("{base}/accounts/{account}"))
                .headers(headers)
                .send()
                .await?
        }
    };
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await.unwrap_or_default();

    if !status.is_success() {
        eprintln!("Error: admin API returned status {status}");
        if !text.is_empty() {
            eprintln!("{text}");
        }
        std::process::exit(1);
    }

    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) if text.is_empty() => println!("{status}"),
        Err(_) => println!("{text}"),
    }
    Ok(())
}
