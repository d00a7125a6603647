use clap::Parser;

use facecam::cli::{self, Args, Command, CommandError};
use facecam::cli::ConfigAction;
use facecam::config::{self, Config, ConfigError};
use facecam::logging;

/// Load config for this invocation.
///
/// An explicit `--config` must exist and parse; problems with the default
/// file fall back to built-in settings with a warning.
fn load_config(path: Option<&std::path::Path>) -> Result<Config, ConfigError> {
    match path {
        Some(path) => {
            if !path.exists() {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
                });
            }
            Config::load(Some(path))
        }
        None => match Config::load(None) {
            Ok(config) => Ok(config),
            Err(e) => {
                eprintln!("Warning: {}", e);
                eprintln!("Using default settings.\n");
                Ok(Config::default())
            }
        },
    }
}

fn dispatch(args: Args) -> Result<(), CommandError> {
    // `config init` creates the file, so it must not require one.
    let config = match args.command {
        Command::Config {
            action: ConfigAction::Init,
        } => Config::default(),
        _ => load_config(args.config.as_deref())?,
    };

    match args.command {
        Command::ListCameras { backend } => cli::list_cameras(backend, &config),
        Command::Torch {
            state,
            first_listed,
        } => cli::set_torch(state, first_listed, &config),
        Command::Run(run_args) => cli::run(run_args, &config),
        Command::Config { action } => {
            let path = args.config.unwrap_or_else(config::default_path);
            cli::handle_config_action(action, &config, &path)
        }
    }
}

fn main() {
    let args = Args::parse();
    logging::init(args.verbose);

    if let Err(e) = dispatch(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
