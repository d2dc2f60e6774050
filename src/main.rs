use std::io::{self, IsTerminal};
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use linkedin_post::auth::SystemBrowser;
use linkedin_post::cli::Cli;
use linkedin_post::commands::{self, Environment, Published, TerminalPrompter};
use linkedin_post::config::{self, Settings};
use linkedin_post::interrupt::InterruptGuard;

fn main() -> ExitCode {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log_level())
        .parse_default_env()
        .format_timestamp(None)
        .init();

    let result = try_main(&cli);
    let code = linkedin_post::exit_status(&result);
    match result {
        Ok(published) => {
            println!("Post published ({})!", published.visibility.describe());
            if let Some(url) = published.url() {
                println!("{}", url);
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::from(code)
        }
    }
}

fn try_main(cli: &Cli) -> anyhow::Result<Published> {
    let home = config::default_home()?;
    let settings = Settings::load(&home)?;
    log::debug!("Using configuration directory {}", home.display());

    let interrupts = InterruptGuard::new();
    interrupts
        .install()
        .context("Failed to install the Ctrl-C handler")?;

    let stdin = io::stdin();
    let stdin_is_terminal = stdin.is_terminal();
    let mut stdin = stdin.lock();

    let mut env = Environment {
        settings,
        stdin: &mut stdin,
        stdin_is_terminal,
        prompter: &TerminalPrompter,
        browser: &SystemBrowser,
        interrupts,
    };

    Ok(commands::run(cli, &mut env)?)
}
