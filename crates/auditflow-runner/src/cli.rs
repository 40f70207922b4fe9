//! Command-line arguments

use std::path::PathBuf;

use auditflow_engine::ExecutionMode;
use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "auditflow", version, about = "Compile and run AuditFlow graphs")]
pub struct Cli {
    /// Engine configuration file (JSON); defaults apply when missing
    #[arg(long, global = true, default_value = "auditflow.json")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List registered node types
    Nodes {
        /// Print full manifests as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compile a graph and print its phases
    Plan {
        /// Graph file (JSON)
        graph: PathBuf,
    },

    /// Compile and execute a graph
    Run {
        /// Graph file (JSON)
        graph: PathBuf,

        /// Initial inputs (JSON object), bound through the `__initial__` node
        #[arg(long)]
        inputs: Option<PathBuf>,

        /// Override the configured execution mode
        #[arg(long, value_parser = parse_mode)]
        mode: Option<ExecutionMode>,

        /// Override the remote task service endpoint
        #[arg(long)]
        endpoint: Option<String>,
    },
}

fn parse_mode(value: &str) -> Result<ExecutionMode, String> {
    value.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_flags() {
        let cli = Cli::parse_from([
            "auditflow",
            "run",
            "graph.json",
            "--mode",
            "remote",
            "--endpoint",
            "http://tasks:3000",
        ]);
        match cli.command {
            Command::Run { graph, mode, endpoint, inputs } => {
                assert_eq!(graph, PathBuf::from("graph.json"));
                assert_eq!(mode, Some(ExecutionMode::Remote));
                assert_eq!(endpoint.as_deref(), Some("http://tasks:3000"));
                assert!(inputs.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert_eq!(cli.config, PathBuf::from("auditflow.json"));
    }

    #[test]
    fn test_rejects_unknown_mode() {
        assert!(Cli::try_parse_from(["auditflow", "run", "g.json", "--mode", "cloud"]).is_err());
    }
}
