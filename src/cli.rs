use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "fogctl")]
#[command(version)]
#[command(about = "Deploy and manage edge fleets: control planes, agents and their workloads", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Namespace to operate on (defaults to `default_namespace` in config.toml)
    #[arg(short, long, env = "FOGCTL_NAMESPACE", global = true)]
    pub namespace: Option<String>,

    /// Answer yes to every confirmation prompt
    #[arg(short, long, global = true)]
    pub yes: bool,

    /// Executors run in parallel within a kind group (0 = unbounded)
    #[arg(short, long, default_value = "4", global = true)]
    pub jobs: usize,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create or update every resource in a YAML file
    Deploy(FileArgs),

    /// Delete every resource in a YAML file
    Delete(FileArgs),

    /// Print the current state of one resource as YAML
    Describe {
        /// Resource kind (e.g. Application, RemoteAgent)
        kind: String,

        /// Resource name
        name: String,
    },

    /// Ship container images to hosts without registry access
    #[command(subcommand)]
    Airgap(AirgapCommand),

    /// Manage the Controller's microservice catalog
    #[command(subcommand)]
    Catalog(CatalogCommand),

    /// Inspect or clear the local image cache
    #[command(subcommand)]
    Cache(CacheCommand),

    /// Manage namespaces
    #[command(subcommand)]
    Namespace(NamespaceCommand),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser)]
pub struct FileArgs {
    /// YAML file with one or more resources (`-` reads stdin)
    #[arg(short, long)]
    pub file: PathBuf,
}

// ============================================================================
// Airgap
// ============================================================================

#[derive(Subcommand)]
pub enum AirgapCommand {
    /// Fetch an image once per platform and load it on agents
    Push {
        /// Image reference (e.g. ghcr.io/acme/api:1.2)
        #[arg(short, long)]
        image: String,

        /// Agents to load the image on
        #[arg(short, long = "agent", required = true)]
        agents: Vec<String>,

        /// Fetch again even if a valid archive is cached
        #[arg(long)]
        no_cache: bool,
    },
}

// ============================================================================
// Catalog
// ============================================================================

#[derive(Clone, Copy, ValueEnum)]
pub enum RegistryArg {
    /// Agents pull from the image's registry
    Remote,
    /// Agents use images already loaded on the host
    Local,
}

#[derive(Subcommand)]
pub enum CatalogCommand {
    /// Create a catalog item, or update it if the name exists
    Register {
        /// Catalog item name
        name: String,

        /// Image for x86-64 agents
        #[arg(long)]
        x86: Option<String>,

        /// Image for ARM agents
        #[arg(long)]
        arm: Option<String>,

        /// Where agents get the images from
        #[arg(long, value_enum, default_value = "remote")]
        registry: RegistryArg,

        #[arg(long, default_value = "")]
        description: String,

        #[arg(long, default_value = "")]
        category: String,
    },
}

// ============================================================================
// Cache
// ============================================================================

#[derive(Subcommand)]
pub enum CacheCommand {
    /// List cached image archives
    List {
        /// Show every namespace, not only the current one
        #[arg(short, long)]
        all: bool,
    },

    /// Remove the current namespace's cached archives
    Prune,
}

// ============================================================================
// Namespace
// ============================================================================

#[derive(Subcommand)]
pub enum NamespaceCommand {
    /// Create an empty namespace
    Create { name: String },

    /// List namespaces
    List,

    /// Delete a namespace record
    Delete {
        name: String,

        /// Delete even if it still has a control plane, agents or volumes
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "fogctl", "deploy", "-f", "fleet.yaml", "-n", "edge", "-y", "-j", "8", "-vv",
        ])
        .unwrap();
        assert_eq!(cli.namespace.as_deref(), Some("edge"));
        assert!(cli.yes);
        assert_eq!(cli.jobs, 8);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Deploy(args) => assert_eq!(args.file, PathBuf::from("fleet.yaml")),
            _ => panic!("expected deploy"),
        }
    }

    #[test]
    fn test_airgap_push_needs_an_agent() {
        assert!(Cli::try_parse_from(["fogctl", "airgap", "push", "--image", "nginx"]).is_err());

        let cli = Cli::try_parse_from([
            "fogctl", "airgap", "push", "--image", "nginx:1", "--agent", "a", "--agent", "b",
            "--no-cache",
        ])
        .unwrap();
        match cli.command {
            Command::Airgap(AirgapCommand::Push {
                image,
                agents,
                no_cache,
            }) => {
                assert_eq!(image, "nginx:1");
                assert_eq!(agents, vec!["a", "b"]);
                assert!(no_cache);
            }
            _ => panic!("expected airgap push"),
        }
    }
}
