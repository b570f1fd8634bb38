use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use log::debug;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use kroctl::commands::with_cancellation;
use kroctl::credentials::LazyProvider;
use kroctl::view::{VersionInfo, View};
use kroctl::{CliConfig, InspectOptions, Kroctl, OciRegistry, PushOptions};

const LONG_ABOUT: &str = "\
kroctl is a CLI utility for working with kro ResourceGraphDefinitions
(RGDs) and packaging them as OCI artifacts for distribution and reuse
across Kubernetes clusters.

kro (Kube Resource Orchestrator) is a Kubernetes-native project that
lets you define custom Kubernetes APIs using simple configuration.
ResourceGraphDefinitions bundle multiple Kubernetes resources together
with logical operations, conditions, and dependencies using CEL
(Common Expression Language).

With kroctl, you can package RGDs as OCI artifacts and publish them to
OCI-compliant registries for sharing and distribution across teams and
clusters.

Learn more about kro at https://kro.run";

const PUSH_AFTER_HELP: &str = "\
Examples:
  kroctl push localhost:5001/kro-stack-network:v1.0.0 \\
    -f stack.yaml -f subnet.yaml -f vpc.yaml

  kroctl push ghcr.io/myorg/kro-stack:latest -f ./rgds/";

const INSPECT_AFTER_HELP: &str = "\
Examples:
  kroctl inspect localhost:5001/kro-stack-network:v1.0.0

  kroctl inspect ghcr.io/acme/kro-stack:latest";

#[derive(Parser)]
#[command(
    name = "kroctl",
    version,
    about = "A utility to work with kro's resource graph definitions and package them as OCI artifacts",
    long_about = LONG_ABOUT
)]
struct Cli {
    #[arg(long, global = true, help = "Output in JSON format")]
    json: bool,

    #[arg(long, global = true, help = "Set log level to debug")]
    debug: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Push ResourceGraphDefinitions to an OCI registry
    #[command(
        long_about = "Push ResourceGraphDefinitions to an OCI registry.\n\n\
            Packages and pushes ResourceGraphDefinitions as an OCI artifact\n\
            to a specified registry. The RGDs must be valid YAML files.",
        after_help = PUSH_AFTER_HELP
    )]
    Push {
        #[arg(help = "Target artifact reference (e.g., ghcr.io/acme/kro-stack:v1)")]
        reference: String,

        #[arg(
            short = 'f',
            long = "filenames",
            required = true,
            num_args = 1..,
            value_delimiter = ',',
            help = "RGD files or directories to push"
        )]
        filenames: Vec<PathBuf>,
    },

    /// Inspect a ResourceGraphDefinition artifact in an OCI registry
    #[command(
        long_about = "Inspect a ResourceGraphDefinition artifact in an OCI registry.\n\n\
            Fetches the manifest from the registry and displays information\n\
            about the RGD stack, including all ResourceGraphDefinitions\n\
            contained in the artifact.",
        after_help = INSPECT_AFTER_HELP
    )]
    Inspect {
        #[arg(help = "Artifact reference to inspect")]
        reference: String,
    },

    /// Print the kroctl version
    Version,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = CliConfig::from_env(cli.json, cli.debug);
    console::set_colors_enabled(config.color);
    console::set_colors_enabled_stderr(config.color);

    env_logger::Builder::new()
        .filter_level(config.log_level.to_level_filter())
        .target(env_logger::Target::Stderr)
        .init();
    debug!("Resolved configuration: {:?}", config);

    match run(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Option<Command>, config: CliConfig) -> Result<()> {
    let Some(command) = command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    let output = match command {
        Command::Version => View::new(config.view).version(&VersionInfo::current()),
        Command::Push {
            reference,
            filenames,
        } => {
            let kroctl = Kroctl::new(
                config,
                OciRegistry::new(),
                Box::new(LazyProvider::default_chain()),
            );
            let opts = PushOptions {
                reference,
                filenames,
            };
            let summary = with_cancellation(kroctl.push(&opts), interrupted()).await;
            kroctl.notifier().finish();
            kroctl.view().push(&summary?)
        }
        Command::Inspect { reference } => {
            let kroctl = Kroctl::new(
                config,
                OciRegistry::new(),
                Box::new(LazyProvider::default_chain()),
            );
            let opts = InspectOptions { reference };
            let report = with_cancellation(kroctl.inspect(&opts), interrupted()).await;
            kroctl.notifier().finish();
            kroctl.view().inspect(&report?)
        }
    };

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(output.as_bytes())?;
    stdout.flush()?;
    Ok(())
}

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}
