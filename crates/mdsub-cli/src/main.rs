use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use mdsub_cli::commands::{self, Outcome, SubmitOptions};
use mdsub_core::CommitMode;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn dictionary_arg() -> Arg {
    Arg::new("dictionary")
        .long("dictionary")
        .short('d')
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help("Dictionary file (JSON or YAML)")
}

fn input_arg() -> Arg {
    Arg::new("input")
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help("Input file")
}

fn content_type_arg() -> Arg {
    Arg::new("content-type")
        .long("content-type")
        .help("Override the content type guessed from the file extension")
}

fn cli() -> Command {
    Command::new("mdsub")
        .version(mdsub_core::VERSION)
        .about("Metadata submission tooling")
        .subcommand_required(true)
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(
            Command::new("validate")
                .about("Normalize and validate a submission file against a dictionary")
                .arg(dictionary_arg())
                .arg(input_arg())
                .arg(content_type_arg()),
        )
        .subcommand(
            Command::new("template")
                .about("Print a submission template for one entity type")
                .arg(dictionary_arg())
                .arg(Arg::new("entity").required(true).help("Entity type"))
                .arg(
                    Arg::new("format")
                        .long("format")
                        .default_value("tsv")
                        .help("tsv, csv or json"),
                ),
        )
        .subcommand(
            Command::new("check-manifest")
                .about("Validate a file-upload manifest")
                .arg(input_arg()),
        )
        .subcommand(
            Command::new("submit")
                .about("Run a submission against an in-memory graph and roll it back")
                .arg(dictionary_arg())
                .arg(input_arg())
                .arg(content_type_arg())
                .arg(Arg::new("program").long("program").required(true))
                .arg(Arg::new("project").long("project").required(true))
                .arg(
                    Arg::new("mode")
                        .long("mode")
                        .default_value("upsert")
                        .value_parser(["create", "upsert", "delete"]),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_parser(value_parser!(PathBuf))
                        .help("Engine configuration (TOML)"),
                ),
        )
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn path(args: &ArgMatches, name: &str) -> anyhow::Result<PathBuf> {
    args.get_one::<PathBuf>(name)
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("missing --{name}"))
}

fn string(args: &ArgMatches, name: &str) -> anyhow::Result<String> {
    args.get_one::<String>(name)
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("missing --{name}"))
}

async fn dispatch(matches: &ArgMatches) -> anyhow::Result<Outcome> {
    match matches.subcommand() {
        Some(("validate", args)) => commands::validate(
            &path(args, "dictionary")?,
            &path(args, "input")?,
            args.get_one::<String>("content-type").map(String::as_str),
        ),
        Some(("template", args)) => commands::template(
            &path(args, "dictionary")?,
            &string(args, "entity")?,
            &string(args, "format")?,
        ),
        Some(("check-manifest", args)) => commands::check_manifest(&path(args, "input")?),
        Some(("submit", args)) => {
            let mode = match string(args, "mode")?.as_str() {
                "create" => CommitMode::Create,
                "delete" => CommitMode::Delete,
                _ => CommitMode::Upsert,
            };
            let options = SubmitOptions {
                dictionary: path(args, "dictionary")?,
                input: path(args, "input")?,
                content_type: args.get_one::<String>("content-type").cloned(),
                program: string(args, "program")?,
                project: string(args, "project")?,
                mode,
                config: args.get_one::<PathBuf>("config").cloned(),
            };
            commands::submit(options).await
        }
        _ => Err(anyhow::anyhow!("unknown command")),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("log-json"));

    match dispatch(&matches).await {
        Ok(outcome) => {
            println!("{}", outcome.output);
            if outcome.success {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("error: {e:#}");
            ExitCode::from(2)
        }
    }
}
