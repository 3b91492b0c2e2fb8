mod cli;
mod commands;
mod completions;
mod picker;

use clap::Parser;
use cli::{Cli, Command};

fn main() {
    let cli = Cli::parse();
    wtd_core::logging::init(&cli.log_level);

    if cli.install {
        match completions::install() {
            Ok(path) => {
                println!("installed completion script to {}", path.display());
                return;
            }
            Err(msg) => {
                eprintln!("error: {msg}");
                std::process::exit(2);
            }
        }
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to start async runtime: {e}");
            std::process::exit(1);
        }
    };

    let result = runtime.block_on(dispatch(cli));

    match result {
        Ok(()) => {}
        Err(e) => {
            eprintln!("error: {e:#}");
            std::process::exit(exit_code_for(&e));
        }
    }
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Some(Command::Prune(args)) => commands::prune::run(args).await,
        Some(Command::List) => commands::list::run_list().await,
        Some(Command::ListContainers) => commands::list::run_list_containers().await,
        Some(Command::ExtList(args)) => commands::ext_list::run(args),
        Some(Command::Doctor) => commands::doctor::run(),
        Some(Command::Completions { shell }) => {
            completions::emit(shell);
            Ok(())
        }
        None => commands::up::run(cli.up).await,
    }
}

/// Map a returned error onto the exit code table in spec.md §7, falling
/// back to the generic usage-error code when the error didn't originate
/// from `wtd_core`.
fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<wtd_core::WtdError>() {
        Some(wtd_err) => wtd_err.exit_code(),
        None => 2,
    }
}
