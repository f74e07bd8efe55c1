use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use swipe::frame::VERSION;
use swipe::swipe::{read_patterns, DEFAULT_PREFIX};
use swipe::{Config, Swipe};

#[derive(Parser, Debug)]
#[command(version, about = "Generates go-kit service scaffolds from Go interfaces")]
struct Args {
  #[command(subcommand)]
  command: Option<Actions>,
}

#[derive(clap::Args, Debug, Default)]
struct GenArgs {
  /// Verbose output.
  #[arg(long = "v")]
  verbose: bool,

  /// Write the options stub packages and exit.
  #[arg(long)]
  init: bool,

  /// Directory, relative to the work dir, receiving the options stubs.
  #[arg(long = "swipe-pkg", default_value = "pkg")]
  swipe_pkg: String,

  /// Work directory.
  #[arg(long = "w")]
  work_dir: Option<PathBuf>,

  /// File name prefix of generated files.
  #[arg(long, default_value = DEFAULT_PREFIX)]
  prefix: String,

  /// Package patterns; `<w>/pkgs` is read when none is given.
  patterns: Vec<String>,
}

#[derive(Subcommand, Debug)]
enum Actions {
  /// Generate code for the packages matching the patterns.
  Gen(GenArgs),
  /// Print the version.
  Version,
}

fn init_tracing(verbose: bool) {
  let filter = match std::env::var("RUST_LOG") {
    Ok(filter) if !filter.is_empty() => EnvFilter::new(filter),
    _ if verbose => EnvFilter::new("debug"),
    _ => EnvFilter::new("info"),
  };
  tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).with_target(false).init();
}

fn generate(args: GenArgs) -> ExitCode {
  let work_dir = match args.work_dir {
    Some(dir) => dir,
    None => match std::env::current_dir() {
      Ok(dir) => dir,
      Err(err) => {
        error!("current directory: {}", err);
        return ExitCode::FAILURE;
      }
    },
  };

  let mut config = Config::new(&work_dir);
  config.prefix = args.prefix;
  if !args.patterns.is_empty() {
    config.patterns = args.patterns;
  } else {
    match read_patterns(&work_dir.join("pkgs")) {
      Ok(Some(patterns)) if !patterns.is_empty() => config.patterns = patterns,
      Ok(_) => {}
      Err(err) => {
        error!("{}", err);
        return ExitCode::FAILURE;
      }
    }
  }

  let swipe = Swipe::new(config);
  if args.init {
    return match swipe.init(&args.swipe_pkg) {
      Ok(written) => {
        info!("wrote {} options packages", written.len());
        ExitCode::SUCCESS
      }
      Err(err) => {
        error!("{}", err);
        ExitCode::FAILURE
      }
    };
  }

  let mut output = swipe.generate();
  Swipe::write(&mut output.results);
  for result in &output.results {
    for err in &result.errs {
      if err.is_warn() {
        warn!("{}: {}", result.output_path.display(), err);
      } else {
        error!("{}: {}", result.output_path.display(), err);
      }
    }
  }
  if output.has_fatal() {
    ExitCode::FAILURE
  } else {
    ExitCode::SUCCESS
  }
}

fn main() -> ExitCode {
  let args = Args::parse();
  let command = args.command.unwrap_or_else(|| {
    Actions::Gen(GenArgs { swipe_pkg: "pkg".to_owned(), prefix: DEFAULT_PREFIX.to_owned(), ..Default::default() })
  });
  match command {
    Actions::Gen(gen) => {
      init_tracing(gen.verbose);
      generate(gen)
    }
    Actions::Version => {
      println!("swipe v{}", VERSION);
      ExitCode::SUCCESS
    }
  }
}
