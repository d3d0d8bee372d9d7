//! Management CLI for a running code-server proxy.

use clap::{Parser, Subcommand};
use prost::Message;
use serde_json::json;

use code_server_proxy::health::{CodeServerStatus, HealthCheck};

#[derive(Parser)]
#[command(name = "proxy-cli")]
#[command(about = "Manage the backends of a code-server proxy", long_about = None)]
struct Cli {
    /// Base URL of the proxy.
    #[arg(short, long, env = "PROXY_URL", default_value = "http://localhost:5555")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every backend with its state and public URLs
    List,
    /// Show one backend
    Status { name: String },
    /// Register a backend serving `folder` on `port`
    Register {
        folder: String,
        name: String,
        port: u16,
    },
    /// Remove a backend
    Remove { name: String },
    /// Print the public URL of a backend if it is up
    OpenUrl { name: String },
}

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() -> CliResult<()> {
    let cli = Cli::parse();
    let base = cli.url.trim_end_matches('/').to_string();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::List => {
            let report: HealthCheck = fetch(&client, &format!("{}/status", base)).await?;
            println!("proxy: {}", report.code_server_proxy);
            if report.code_servers.is_empty() {
                println!("no backends registered");
            }
            for server in &report.code_servers {
                print_server(server);
            }
        }
        Commands::Status { name } => {
            let server: CodeServerStatus =
                fetch(&client, &format!("{}/status/{}", base, name)).await?;
            print_server(&server);
        }
        Commands::Register { folder, name, port } => {
            let body = json!({ "folder": folder, "name": name, "port": port.to_string() });
            let res = client
                .post(format!("{}/register", base))
                .json(&body)
                .send()
                .await?;
            check(res).await?;
            println!("registered {} on port {}", name, port);
        }
        Commands::Remove { name } => {
            let res = client
                .delete(format!("{}/remove/{}", base, name))
                .send()
                .await?;
            check(res).await?;
            println!("removed {}", name);
        }
        Commands::OpenUrl { name } => {
            let server: CodeServerStatus =
                fetch(&client, &format!("{}/status/{}", base, name)).await?;
            if !server.is_ok() {
                return Err(format!("{} is {}", name, server.state).into());
            }
            println!("{}", server.alias_url);
        }
    }

    Ok(())
}

async fn fetch<M: Message + Default>(client: &reqwest::Client, url: &str) -> CliResult<M> {
    let res = check(client.get(url).send().await?).await?;
    let bytes = res.bytes().await?;
    Ok(M::decode(bytes)?)
}

async fn check(res: reqwest::Response) -> CliResult<reqwest::Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let text = res.text().await.unwrap_or_default();
    Err(format!("proxy returned {}: {}", status, text.trim()).into())
}

fn print_server(server: &CodeServerStatus) {
    println!(
        "{:<20} {:<7} port {:<6} {}  ({})",
        server.alias, server.state, server.port, server.alias_url, server.url
    );
}
