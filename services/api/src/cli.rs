use crate::demo::{run_demo, DemoArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use highriz_intake::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "HighRiz Intake",
    about = "Serve and operate the HighRiz form submission intake",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Verify the spreadsheet, Drive folder and SMTP relay without serving
    Check,
    /// Push a sample contact and enquiry through in-memory sinks
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Check => server::check().await,
        Command::Demo(args) => run_demo(args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn check_subcommand_parses() {
        let cli = Cli::try_parse_from(["highriz-intake", "check"]).expect("check parses");
        assert!(matches!(cli.command, Some(Command::Check)));
    }

    #[test]
    fn check_help_names_each_dependency() {
        let command = Cli::command();
        let check = command.find_subcommand("check").expect("check subcommand");
        let about = check.get_about().expect("about").to_string();

        assert!(about.contains("spreadsheet"));
        assert!(about.contains("Drive folder"));
        assert!(about.contains("SMTP relay"));
    }

    #[test]
    fn missing_subcommand_defaults_to_serve() {
        let cli = Cli::try_parse_from(["highriz-intake"]).expect("no args parse");
        assert!(cli.command.is_none());
    }
}
