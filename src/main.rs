mod cli;
mod commands;
mod config;
mod context;
mod engine;
mod paths;
mod plane;
mod resource;
mod runner;
mod store;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{AirgapCommand, CacheCommand, CatalogCommand, Cli, Command, NamespaceCommand};
use config::Settings;
use context::Context;
use paths::Paths;
use std::io;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let paths = Paths::resolve()?;
    let settings = Settings::load(&paths.config_file())?;
    let mut ctx = Context::new(paths, settings);
    if let Some(namespace) = cli.namespace {
        ctx.namespace = namespace;
    }
    ctx.quiet = cli.quiet;
    ctx.yes = cli.yes;
    ctx.jobs = cli.jobs;

    // Stops image fetches; SSH transfers already running finish
    let cancel = ctx.cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        if cancel.is_cancelled() {
            std::process::exit(130);
        }
        cancel.cancel();
        eprintln!("Interrupted, finishing transfers in flight (press Ctrl-C again to abort)");
    }) {
        log::warn!("Could not install Ctrl-C handler: {}", e);
    }

    match cli.command {
        Command::Deploy(args) => commands::resources::deploy(&ctx, &args.file),
        Command::Delete(args) => commands::resources::delete(&ctx, &args.file),
        Command::Describe { kind, name } => commands::resources::describe(&ctx, &kind, &name),
        Command::Airgap(AirgapCommand::Push {
            image,
            agents,
            no_cache,
        }) => commands::push::push(&ctx, &image, &agents, no_cache),
        Command::Catalog(CatalogCommand::Register {
            name,
            x86,
            arm,
            registry,
            description,
            category,
        }) => commands::catalog::register(
            &ctx,
            commands::catalog::RegisterArgs {
                name,
                x86,
                arm,
                registry,
                description,
                category,
            },
        ),
        Command::Cache(CacheCommand::List { all }) => commands::cache::list(&ctx, all),
        Command::Cache(CacheCommand::Prune) => commands::cache::prune(&ctx),
        Command::Namespace(cmd) => match cmd {
            NamespaceCommand::Create { name } => commands::namespace::create(&ctx, &name),
            NamespaceCommand::List => commands::namespace::list(&ctx),
            NamespaceCommand::Delete { name, force } => {
                commands::namespace::delete(&ctx, &name, force)
            }
        },
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "fogctl", &mut io::stdout());
            Ok(())
        }
    }
}
