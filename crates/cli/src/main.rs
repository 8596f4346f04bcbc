mod sandbox_commands;

use std::{path::PathBuf, process::ExitCode, sync::Arc};

use {
    clap::{Parser, Subcommand},
    sandboxed_config::{Backend, SandboxedConfig},
    sandboxed_engine::{EngineConfig, SandboxEngine, create_cluster_client},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "sandboxed", about = "sandboxed: run code in Kubernetes sandbox pods")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file to load instead of the discovered one.
    #[arg(long, global = true, env = "SANDBOXED_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Cluster backend (auto, kubectl, local). Overrides the config file.
    /// `local` runs commands directly on this host.
    #[arg(long, global = true, env = "SANDBOXED_BACKEND")]
    backend: Option<Backend>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server.
    Server {
        #[arg(long)]
        bind: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Serve MCP tools over stdin/stdout.
    Mcp,
    /// Run a program in a fresh sandbox, then delete it.
    Run {
        #[arg(short, long)]
        language: String,
        /// Program source.
        #[arg(short, long, conflicts_with = "file", required_unless_present = "file")]
        code: Option<String>,
        /// Read the program source from a file.
        #[arg(short, long)]
        file: Option<PathBuf>,
        #[arg(short, long)]
        namespace: Option<String>,
    },
    /// Run a shell command in an existing sandbox.
    Exec {
        #[arg(long)]
        name: String,
        #[arg(short, long)]
        namespace: Option<String>,
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
    /// Delete a sandbox pod.
    Destroy {
        name: String,
        #[arg(short, long)]
        namespace: Option<String>,
    },
    /// List sandbox pods.
    Pods {
        #[arg(short, long)]
        namespace: Option<String>,
    },
    /// Print a sandbox's container logs.
    Logs {
        name: String,
        #[arg(short, long)]
        namespace: Option<String>,
    },
    /// List supported languages and their images.
    Languages,
    /// Print the version.
    Version,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    // stdout carries protocol and command output; logs always go to stderr.
    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        let ansi = !matches!(cli.command, Commands::Mcp);
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(ansi)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<SandboxedConfig> {
    let mut config = match &cli.config {
        Some(path) => sandboxed_config::load_config(path)?,
        None => sandboxed_config::discover_and_load()?,
    };
    if let Some(backend) = cli.backend {
        config.cluster.backend = backend;
    }
    Ok(config)
}

async fn build_engine(config: &SandboxedConfig) -> anyhow::Result<SandboxEngine> {
    let client = create_cluster_client(&config.cluster).await?;
    Ok(SandboxEngine::new(client, EngineConfig::from(config)))
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    if matches!(cli.command, Commands::Version) {
        println!("sandboxed {}", env!("CARGO_PKG_VERSION"));
        return Ok(ExitCode::SUCCESS);
    }
    if matches!(cli.command, Commands::Languages) {
        sandbox_commands::languages();
        return Ok(ExitCode::SUCCESS);
    }

    let config = load_config(&cli)?;
    let engine = build_engine(&config).await?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        backend = engine.backend_name(),
        "sandboxed starting"
    );

    match cli.command {
        Commands::Server { bind, port } => {
            let bind = bind.unwrap_or(config.server.bind);
            let port = port.unwrap_or(config.server.port);
            let state = sandboxed_gateway::GatewayState::new(engine);
            sandboxed_gateway::start_gateway(state, &bind, port).await?;
            Ok(ExitCode::SUCCESS)
        },
        Commands::Mcp => {
            let tools = sandboxed_mcp::ToolRegistry::with_sandbox_tools(engine.clone());
            let served = Arc::new(sandboxed_mcp::McpServer::new(tools))
                .serve_stdio()
                .await;
            let destroyed = engine.destroy_all().await;
            info!(destroyed, "mcp server stopped");
            served.map(|()| ExitCode::SUCCESS)
        },
        Commands::Run {
            language,
            code,
            file,
            namespace,
        } => {
            let source = sandbox_commands::read_source(code, file.as_deref())?;
            sandbox_commands::run(&engine, &language, &source, namespace).await
        },
        Commands::Exec {
            name,
            namespace,
            command,
        } => sandbox_commands::exec(&engine, &name, namespace.as_deref(), &command).await,
        Commands::Destroy { name, namespace } => {
            sandbox_commands::destroy(&engine, &name, namespace.as_deref()).await
        },
        Commands::Pods { namespace } => {
            sandbox_commands::pods(&engine, namespace.as_deref()).await
        },
        Commands::Logs { name, namespace } => {
            sandbox_commands::logs(&engine, &name, namespace.as_deref()).await
        },
        Commands::Languages | Commands::Version => Ok(ExitCode::SUCCESS),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, clap::CommandFactory};

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_exec_trailing_command() {
        let cli = Cli::try_parse_from([
            "sandboxed", "exec", "--name", "s1", "--", "ls", "-la", "/tmp",
        ])
        .unwrap();
        match cli.command {
            Commands::Exec { name, command, .. } => {
                assert_eq!(name, "s1");
                assert_eq!(command, ["ls", "-la", "/tmp"]);
            },
            _ => panic!("expected exec"),
        }
    }

    #[test]
    fn test_run_requires_code_or_file() {
        assert!(Cli::try_parse_from(["sandboxed", "run", "--language", "python"]).is_err());
        assert!(
            Cli::try_parse_from([
                "sandboxed", "run", "-l", "python", "-c", "print(1)", "-f", "x.py"
            ])
            .is_err()
        );
        assert!(Cli::try_parse_from(["sandboxed", "run", "-l", "python", "-c", "print(1)"]).is_ok());
    }

    #[test]
    fn test_backend_flag_overrides_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sandboxed.toml");
        std::fs::write(&path, "[cluster]\nbackend = \"kubectl\"\nnamespace = \"ci\"\n").unwrap();
        let path = path.to_str().unwrap();

        let cli = Cli::try_parse_from(["sandboxed", "--config", path, "pods"]).unwrap();
        let config = load_config(&cli).unwrap();
        assert_eq!(config.cluster.backend, Backend::Kubectl);
        assert_eq!(config.cluster.namespace, "ci");

        let cli =
            Cli::try_parse_from(["sandboxed", "--config", path, "--backend", "local", "pods"])
                .unwrap();
        assert_eq!(load_config(&cli).unwrap().cluster.backend, Backend::Local);
    }

    #[test]
    fn test_unknown_backend_rejected() {
        assert!(Cli::try_parse_from(["sandboxed", "--backend", "docker", "pods"]).is_err());
    }
}
