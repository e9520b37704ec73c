use clap::Parser;

use valet_mcp_runtime::{McpCommands, run as run_mcp};

#[derive(Parser)]
#[command(
    name = "valet-mcp",
    version,
    about = "Valet MCP server — personal helper tools over stdio"
)]
struct Cli {
    #[command(subcommand)]
    command: McpCommands,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let code = run_mcp(cli.command).await;
    std::process::exit(code);
}
