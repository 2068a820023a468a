use clap::{App, AppSettings, Arg, SubCommand};
use log::LevelFilter;
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use num_enum::TryFromPrimitive;
use serde::de::DeserializeOwned;
use std::fmt::Display;
use zkballot::ProtocolConfig;

mod command_credential;
mod command_e2e;
mod command_eligibility;
mod command_keygen;
mod command_verify;
mod command_vote;

#[derive(TryFromPrimitive, PartialEq, Copy, Clone, Debug)]
#[repr(u8)]
pub enum Verbosity {
    Silent = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
}

impl Verbosity {
    fn level(self) -> LevelFilter {
        match self {
            Verbosity::Silent => LevelFilter::Off,
            Verbosity::Error => LevelFilter::Error,
            Verbosity::Warn => LevelFilter::Warn,
            Verbosity::Info => LevelFilter::Info,
            Verbosity::Debug => LevelFilter::Debug,
        }
    }
}

fn main() {
    let matches = App::new("zkballot")
        .version("0.1")
        .about("Anonymous elections with Merkle eligibility proofs and nullifiers")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("v")
                .short("v")
                .multiple(true)
                .global(true)
                .help("Sets the level of verbosity"),
        )
        .arg(
            Arg::with_name("quiet")
                .short("q")
                .long("quiet")
                .global(true)
                .help("Silence all logging"),
        )
        .subcommand(
            SubCommand::with_name("keygen").about("Generate an election encryption keypair"),
        )
        .subcommand(
            SubCommand::with_name("credential")
                .about("Issue a voter credential. The output contains the voter secret.")
                .arg(
                    Arg::with_name("IDENTITY")
                        .index(1)
                        .required(true)
                        .help("Raw voter identity, such as an email address"),
                ),
        )
        .subcommand(
            SubCommand::with_name("eligibility")
                .about("Build an eligibility tree and print its root")
                .arg(
                    Arg::with_name("VOTERS")
                        .index(1)
                        .required(true)
                        .help("File with one voter identity per line"),
                )
                .arg(
                    Arg::with_name("prove")
                        .long("prove")
                        .takes_value(true)
                        .value_name("IDENTITY")
                        .help("Also print a membership proof for this identity"),
                ),
        )
        .subcommand(
            SubCommand::with_name("vote")
                .about("Produce a ballot submission")
                .arg(
                    Arg::with_name("election-id")
                        .long("election-id")
                        .takes_value(true)
                        .required(true),
                )
                .arg(
                    Arg::with_name("candidates")
                        .long("candidates")
                        .takes_value(true)
                        .required(true)
                        .help("Number of candidates in the election"),
                )
                .arg(
                    Arg::with_name("key")
                        .long("key")
                        .takes_value(true)
                        .required(true)
                        .help("Election public key in hex"),
                )
                .arg(
                    Arg::with_name("CREDENTIAL")
                        .index(1)
                        .required(true)
                        .help("Credential file in JSON or CBOR format"),
                )
                .arg(
                    Arg::with_name("ELIGIBILITY")
                        .index(2)
                        .required(true)
                        .help("Membership proof file in JSON or CBOR format"),
                )
                .arg(
                    Arg::with_name("CANDIDATE")
                        .index(3)
                        .required(true)
                        .help("Index of the chosen candidate"),
                ),
        )
        .subcommand(
            SubCommand::with_name("verify")
                .about("Check a ballot submission against an election")
                .arg(
                    Arg::with_name("election-id")
                        .long("election-id")
                        .takes_value(true)
                        .required(true),
                )
                .arg(
                    Arg::with_name("root")
                        .long("root")
                        .takes_value(true)
                        .required(true)
                        .help("Eligibility root in hex"),
                )
                .arg(
                    Arg::with_name("SUBMISSION")
                        .index(1)
                        .required(true)
                        .help("Submission file in JSON or CBOR format"),
                ),
        )
        .subcommand(
            SubCommand::with_name("e2e")
                .about("Run a complete election in memory and print the results")
                .arg(
                    Arg::with_name("voters")
                        .long("voters")
                        .takes_value(true)
                        .default_value("10"),
                )
                .arg(
                    Arg::with_name("candidates")
                        .long("candidates")
                        .takes_value(true)
                        .default_value("Alice,Bob,Carol")
                        .help("Comma separated candidate names"),
                )
                .arg(
                    Arg::with_name("print-votes")
                        .long("print-votes")
                        .help("Print each accepted receipt"),
                ),
        )
        .get_matches();

    let verbosity = if matches.is_present("quiet") {
        Verbosity::Silent
    } else {
        let level = 2 + matches.occurrences_of("v").min(2) as u8;
        Verbosity::try_from_primitive(level).unwrap_or(Verbosity::Debug)
    };
    init_logging(verbosity);

    let config = ProtocolConfig::from_env().unwrap_or_else(|e| exit_with("config", e));

    // Subcommands
    match matches.subcommand() {
        ("keygen", Some(matches)) => command_keygen::command_keygen(matches),
        ("credential", Some(matches)) => command_credential::command_credential(matches),
        ("eligibility", Some(matches)) => {
            command_eligibility::command_eligibility(matches, &config)
        }
        ("vote", Some(matches)) => command_vote::command_vote(matches, &config),
        ("verify", Some(matches)) => command_verify::command_verify(matches),
        ("e2e", Some(matches)) => command_e2e::command_e2e(matches, config),
        _ => unreachable!("clap requires a subcommand"),
    }
}

fn init_logging(verbosity: Verbosity) {
    let stderr = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new("{d(%H:%M:%S)} {h({l})} {t} - {m}{n}")))
        .build();

    let config = Config::builder()
        .appender(Appender::builder().build("stderr", Box::new(stderr)))
        .build(Root::builder().appender("stderr").build(verbosity.level()));

    match config {
        Ok(config) => {
            if let Err(e) = log4rs::init_config(config) {
                eprintln!("zkballot: unable to initialize logging: {}", e);
            }
        }
        Err(e) => eprintln!("zkballot: invalid logging configuration: {}", e),
    }
}

/// Expand `~` and environment variables in an argument.
pub fn expand(input: &str) -> String {
    match shellexpand::full(input) {
        Ok(expanded) => expanded.into_owned(),
        Err(e) => exit_with("arguments", e),
    }
}

/// Read a JSON or CBOR file, detected from its content.
pub fn read_input<T: DeserializeOwned>(command: &str, filename: &str) -> T {
    use content_inspector::ContentType;

    let filename = expand(filename);
    let file_bytes = match std::fs::read(&filename) {
        Ok(bytes) => bytes,
        Err(e) => exit_with(command, format!("unable to read {}: {}", filename, e)),
    };

    match content_inspector::inspect(&file_bytes) {
        ContentType::UTF_8 => serde_json::from_slice(&file_bytes)
            .unwrap_or_else(|e| exit_with(command, format!("unable to read {}: {}", filename, e))),
        ContentType::BINARY => serde_cbor::from_slice(&file_bytes)
            .unwrap_or_else(|e| exit_with(command, format!("unable to read {}: {}", filename, e))),
        _ => exit_with(command, format!("invalid file format for {}", filename)),
    }
}

/// Print a value as pretty JSON on stdout.
pub fn print_json<T: serde::Serialize>(command: &str, value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => exit_with(command, e),
    }
}

pub fn exit_with(command: &str, err: impl Display) -> ! {
    eprintln!("zkballot {}: {}", command, err);
    std::process::exit(1);
}
