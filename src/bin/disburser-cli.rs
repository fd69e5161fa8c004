use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "disburser-cli")]
#[command(about = "Operator CLI for the quorum disburser API", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum VoteArg {
    Approve,
    Reject,
}

#[derive(Clone, Copy, ValueEnum)]
enum StatusArg {
    Pending,
    Success,
    Failed,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a disbursement intent
    Create {
        #[arg(long)]
        destination: String,
        #[arg(long)]
        token_id: i64,
        /// Amount in base units
        #[arg(long)]
        amount: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Creator identity (address)
        #[arg(long)]
        creator: String,
    },
    /// Vote on an intent
    Vote {
        intent_id: i64,
        #[arg(long)]
        approver_id: String,
        #[arg(long)]
        approver_address: String,
        #[arg(long, value_enum, default_value = "approve")]
        vote: VoteArg,
    },
    /// List intents, newest first
    Intents {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 10)]
        size: u32,
    },
    /// Show one intent with its votes and transfer
    Intent { id: i64 },
    /// List transfer jobs
    Transfers {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 10)]
        size: u32,
        #[arg(long, value_enum)]
        status: Option<StatusArg>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let res = match cli.command {
        Commands::Create {
            destination,
            token_id,
            amount,
            description,
            creator,
        } => {
            client
                .post(format!("{}/intent/create", cli.url))
                .json(&json!({
                    "destination": destination,
                    "tokenId": token_id,
                    "amount": amount,
                    "description": description,
                    "creator": creator,
                }))
                .send()
                .await?
        }
        Commands::Vote {
            intent_id,
            approver_id,
            approver_address,
            vote,
        } => {
            let vote = match vote {
                VoteArg::Approve => "approved",
                VoteArg::Reject => "rejected",
            };
            client
                .post(format!("{}/intent/vote", cli.url))
                .json(&json!({
                    "intentId": intent_id,
                    "approverId": approver_id,
                    "approverAddress": approver_address,
                    "vote": vote,
                }))
                .send()
                .await?
        }
        Commands::Intents { page, size } => {
            client
                .get(format!("{}/intent/page", cli.url))
                .query(&[("pageNum", page), ("pageSize", size)])
                .send()
                .await?
        }
        Commands::Intent { id } => client.get(format!("{}/intent/{}", cli.url, id)).send().await?,
        Commands::Transfers { page, size, status } => {
            let mut query = vec![
                ("pageNum", page.to_string()),
                ("pageSize", size.to_string()),
            ];
            if let Some(status) = status {
                let status = match status {
                    StatusArg::Pending => "pending",
                    StatusArg::Success => "success",
                    StatusArg::Failed => "failed",
                };
                query.push(("status", status.to_string()));
            }
            client
                .get(format!("{}/transfer/page", cli.url))
                .query(&query)
                .send()
                .await?
        }
    };

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);

    if json["code"].as_u64() != Some(200) {
        std::process::exit(2);
    }
    Ok(())
}
