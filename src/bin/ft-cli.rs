use clap::{Parser, Subcommand};
use serde_json::{json, Value};

use ft_relay::resilience::RetryPolicy;

#[derive(Parser)]
#[command(name = "ft-cli")]
#[command(about = "Command-line client for the fungible token relay", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:3000")]
    url: String,

    /// Attempts for failures the relay reports as retryable
    #[arg(long, default_value_t = 5)]
    attempts: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a token; the issuer WIF is read from the given environment variable
    Genesis {
        #[arg(long, default_value = "FT_ISSUER_WIF")]
        wif_env: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        symbol: String,
        #[arg(long, default_value_t = 0)]
        decimals: u8,
    },
    /// Mint tokens to a receiver
    Issue {
        #[arg(long, default_value = "FT_ISSUER_WIF")]
        wif_env: String,
        #[arg(long)]
        genesis_id: String,
        #[arg(long)]
        amount: String,
        #[arg(long)]
        receiver: String,
        /// Keep the issuance contract open for later issues
        #[arg(long)]
        reissuable: bool,
    },
    /// Send tokens; receivers are `address:amount` pairs
    Transfer {
        #[arg(long, default_value = "FT_SENDER_WIF")]
        wif_env: String,
        #[arg(long)]
        genesis_id: String,
        #[arg(required = true)]
        receivers: Vec<String>,
    },
    /// Consolidate a holder's token outputs
    Merge {
        #[arg(long, default_value = "FT_SENDER_WIF")]
        wif_env: String,
        #[arg(long)]
        genesis_id: String,
    },
    /// List issued tokens
    Issues {
        #[arg(long, default_value_t = 10)]
        page_size: usize,
        #[arg(long, default_value_t = 1)]
        page: usize,
    },
    /// Token balance of an address
    Balance {
        #[arg(long)]
        genesis_id: String,
        #[arg(long)]
        address: String,
    },
    /// Fee wallet status
    Wallets,
}

enum Call {
    Get(String, Vec<(&'static str, String)>),
    Post(String, Value),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/').to_string();

    let call = match cli.command {
        Commands::Genesis {
            wif_env,
            name,
            symbol,
            decimals,
        } => Call::Post(
            format!("{base}/api/ft/genesis"),
            json!({
                "genesisWif": read_wif(&wif_env)?,
                "tokenName": name,
                "tokenSymbol": symbol,
                "decimalNum": decimals,
            }),
        ),
        Commands::Issue {
            wif_env,
            genesis_id,
            amount,
            receiver,
            reissuable,
        } => Call::Post(
            format!("{base}/api/ft/issue"),
            json!({
                "genesisWif": read_wif(&wif_env)?,
                "genesisId": genesis_id,
                "tokenAmount": amount,
                "receiverAddress": receiver,
                "allowIncreaseIssues": reissuable,
            }),
        ),
        Commands::Transfer {
            wif_env,
            genesis_id,
            receivers,
        } => {
            let receivers = receivers
                .iter()
                .map(|r| parse_receiver(r))
                .collect::<Result<Vec<_>, _>>()?;
            Call::Post(
                format!("{base}/api/ft/transfer"),
                json!({
                    "genesisId": genesis_id,
                    "senderWif": read_wif(&wif_env)?,
                    "receivers": receivers,
                }),
            )
        }
        Commands::Merge { wif_env, genesis_id } => Call::Post(
            format!("{base}/api/ft/merge"),
            json!({
                "genesisId": genesis_id,
                "senderWif": read_wif(&wif_env)?,
            }),
        ),
        Commands::Issues { page_size, page } => Call::Get(
            format!("{base}/api/ft/queryIssueList"),
            vec![("pageSize", page_size.to_string()), ("currentPage", page.to_string())],
        ),
        Commands::Balance { genesis_id, address } => Call::Get(
            format!("{base}/api/ft/queryAddressBalance"),
            vec![("genesisId", genesis_id), ("address", address)],
        ),
        Commands::Wallets => Call::Get(format!("{base}/api/wallets"), Vec::new()),
    };

    let policy = RetryPolicy {
        max_attempts: cli.attempts.max(1),
        ..RetryPolicy::default()
    };

    let mut attempt = 0;
    loop {
        attempt += 1;
        let res = match &call {
            Call::Get(url, query) => client.get(url).query(query).send().await?,
            Call::Post(url, body) => client.post(url).json(body).send().await?,
        };

        let status = res.status();
        let text = res.text().await?;
        let json: Value = serde_json::from_str(&text).unwrap_or(Value::String(text));

        if status.is_success() {
            println!("{}", serde_json::to_string_pretty(&json)?);
            return Ok(());
        }

        let retryable = json.get("retryable").and_then(Value::as_bool).unwrap_or(false);
        match policy.delay(attempt) {
            Some(delay) if retryable => {
                eprintln!(
                    "Attempt {attempt} failed ({}), retrying in {:?}",
                    json.get("message").and_then(Value::as_str).unwrap_or("unknown error"),
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            _ => {
                eprintln!("Error: relay returned status {status}");
                eprintln!("{}", serde_json::to_string_pretty(&json)?);
                std::process::exit(1);
            }
        }
    }
}

fn read_wif(var: &str) -> Result<String, String> {
    std::env::var(var).map_err(|_| format!("environment variable {var} is not set"))
}

fn parse_receiver(raw: &str) -> Result<Value, String> {
    let (address, amount) = raw
        .split_once(':')
        .ok_or_else(|| format!("receiver {raw:?} is not address:amount"))?;
    if amount.is_empty() || !amount.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("amount {amount:?} is not a non-negative integer"));
    }
    Ok(json!({ "address": address, "amount": amount }))
}
