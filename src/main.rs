use argh::FromArgs;
use sigil_engine::{Config, Interpreter};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use tracing::warn;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(FromArgs)]
/// Run Sigil scripts, or start an interactive session when no script is given.
struct Cli {
    /// directory holding profiles, plugins and history (overrides SIGIL_HOME).
    #[argh(option)]
    home: Option<PathBuf>,

    /// profile to activate at startup (overrides SIGIL_PROFILE).
    #[argh(option, short = 'p')]
    profile: Option<String>,

    /// run this code instead of a script file.
    #[argh(option, short = 'c')]
    code: Option<String>,

    /// script to run, followed by the arguments passed to the script.
    #[argh(positional, greedy, arg_name = "script")]
    script_and_args: Vec<String>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("SIGIL_LOG").unwrap_or_else(|_| EnvFilter::new("error"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .with(filter)
        .init();
}

fn main() {
    init_tracing();
    let cli: Cli = argh::from_env();

    let mut config = Config::from_env();
    if let Some(home) = cli.home {
        config = Config {
            home,
            ..config
        };
    }
    if let Some(profile) = cli.profile {
        config.profile = profile;
    }

    let mut sigil = match Interpreter::from_config(config) {
        Ok(sigil) => sigil,
        Err(err) => {
            eprintln!("sigil: {err}");
            std::process::exit(1);
        }
    };

    let interrupt = sigil.interrupt_flag();
    if let Err(err) = ctrlc::set_handler(move || interrupt.store(true, Ordering::SeqCst)) {
        warn!("failed to install the Ctrl-C handler: {err}");
    }

    let mut rest = cli.script_and_args.into_iter();
    let script = rest.next().map(PathBuf::from);
    let args: Vec<String> = rest.collect();

    let code = match (cli.code, script) {
        (Some(code), _) => sigil.run_code(&code),
        (None, Some(script)) => sigil.run_script(&script, args),
        (None, None) => match sigil.repl() {
            Ok(code) => code,
            Err(err) => {
                eprintln!("sigil: {err}");
                1
            }
        },
    };
    std::process::exit(code);
}
