//! edusync CLI entry point.

use clap::Parser;
use edusync::cli::commands;
use edusync::cli::{Cli, Commands};
use edusync::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);

    // --json or non-TTY stdout
    let json = cli.json || !std::io::IsTerminal::is_terminal(&std::io::stdout());

    match run(&cli, json) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if json {
                eprintln!("{}", e.to_structured_json());
            } else if !cli.quiet {
                if let Some(hint) = e.hint() {
                    eprintln!("Error: {e}\n  Hint: {hint}");
                } else {
                    eprintln!("Error: {e}");
                }
            }
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    if quiet {
        return;
    }

    // Honor RUST_LOG if set, otherwise use verbosity flag
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug,rusqlite=info,reqwest=info,hyper=info"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn run(cli: &Cli, json: bool) -> Result<(), Error> {
    let db = cli.db.as_ref();
    let remote = cli.remote.as_deref();

    match &cli.command {
        Commands::Init { force } => commands::init::execute(db, *force, json),
        Commands::Version => commands::version::execute(json),

        // Network
        Commands::Sync => commands::sync::execute(db, remote, json),
        Commands::Write(args) => commands::write::execute(args, db, remote, json),
        Commands::Outbox { command } => commands::outbox::execute(command, db, remote, json),
        Commands::Mirror { collections } => commands::mirror::execute(collections, db, remote, json),
        Commands::Watch => commands::watch::execute(db, remote, json),

        // Offline reads
        Commands::Status => commands::status::execute(db, remote, json),
        Commands::Content { command } => commands::content::execute(command, db, json),
        Commands::Collection { command } => commands::collection::execute(command, db, json),
        Commands::Ai { command } => commands::ai::execute(command, db, json),

        Commands::Completions { shell } => commands::completions::execute(shell),
    }
}
