use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "proxy-cli")]
#[command(about = "Management CLI for the vault proxy", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check proxy system status
    Status,
    /// List vaults
    Vaults,
    /// Create a vault
    CreateVault {
        /// Vault ID (the host label clients address it by)
        id: String,
        /// Default backend, e.g. http://127.0.0.1:3000
        upstream: String,
    },
    /// Delete a vault and all of its routes
    DeleteVault { id: String },
    /// List the routes of a vault
    Routes { vault: String },
    /// Create a route on a vault
    CreateRoute {
        vault: String,
        #[arg(long, default_value = "inbound")]
        direction: String,
        #[arg(long)]
        method: String,
        #[arg(long)]
        path: String,
        /// Comma-separated field names
        #[arg(long)]
        fields: String,
        /// append | mask | tokenize | detokenize | passthrough
        #[arg(long)]
        action: String,
        /// Suffix for the append action
        #[arg(long)]
        suffix: Option<String>,
        /// Backend override for this route
        #[arg(long)]
        upstream: Option<String>,
    },
    /// Delete one route
    DeleteRoute { vault: String, route: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );
    let base = cli.url.trim_end_matches('/');

    let request = match cli.command {
        Commands::Status => client.get(format!("{}/admin/status", base)),
        Commands::Vaults => client.get(format!("{}/admin/vaults", base)),
        Commands::CreateVault { id, upstream } => client
            .post(format!("{}/admin/vaults", base))
            .json(&json!({ "id": id, "upstream": upstream })),
        Commands::DeleteVault { id } => client.delete(format!("{}/admin/vaults/{}", base, id)),
        Commands::Routes { vault } => client.get(format!("{}/admin/vaults/{}/routes", base, vault)),
        Commands::CreateRoute {
            vault,
            direction,
            method,
            path,
            fields,
            action,
            suffix,
            upstream,
        } => {
            let mut action = json!({ "type": action });
            if let Some(suffix) = suffix {
                action["suffix"] = Value::String(suffix);
            }
            let mut route = json!({
                "direction": direction,
                "method": method,
                "path": path,
                "fields": fields,
                "action": action,
            });
            if let Some(upstream) = upstream {
                route["upstream"] = Value::String(upstream);
            }
            client
                .post(format!("{}/admin/vaults/{}/routes", base, vault))
                .json(&route)
        }
        Commands::DeleteRoute { vault, route } => {
            client.delete(format!("{}/admin/vaults/{}/routes/{}", base, vault, route))
        }
    };

    let res = request.headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let text = res.text().await?;
    if text.is_empty() {
        println!("{}", status);
        return Ok(());
    }
    let json: Value = serde_json::from_str(&text)?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
