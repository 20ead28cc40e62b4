//! Command line interface definition

use clap::{Parser, Subcommand, ValueEnum};
use kiln_config::ColorChoice;
use std::path::PathBuf;

/// kiln - installs apk packages into a target root
#[derive(Parser)]
#[command(name = "kiln")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Installs apk packages into a target root")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Global arguments available for all commands
#[derive(Parser)]
pub struct GlobalArgs {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable debug logging on stderr
    #[arg(long, global = true)]
    pub debug: bool,

    /// Color output control
    #[arg(long, global = true, value_enum)]
    pub color: Option<ColorArg>,

    /// Use alternate config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Root to manage instead of /
    #[arg(short = 'p', long, global = true, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Keep expanded packages here for later offline installs
    #[arg(long, global = true, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Primary architecture
    #[arg(long, global = true)]
    pub arch: Option<String>,

    /// Concurrent package expansions (0 = auto)
    #[arg(short, long, global = true)]
    pub jobs: Option<usize>,
}

/// Color choice as accepted on the command line
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ColorArg {
    Always,
    Auto,
    Never,
}

impl From<ColorArg> for ColorChoice {
    fn from(color: ColorArg) -> Self {
        match color {
            ColorArg::Always => ColorChoice::Always,
            ColorArg::Auto => ColorChoice::Auto,
            ColorArg::Never => ColorChoice::Never,
        }
    }
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Create the package database layout in the root
    Init {
        /// Repository to record in etc/apk/repositories (repeatable)
        #[arg(short = 'X', long = "repository", value_name = "URL")]
        repositories: Vec<String>,

        /// Initial world constraints
        packages: Vec<String>,
    },

    /// Install the root's world
    #[command(alias = "fix")]
    Install {
        /// Timestamp recorded for install scripts
        #[arg(long, env = "SOURCE_DATE_EPOCH", value_name = "SECONDS")]
        source_date_epoch: Option<u64>,
    },

    /// Add constraints to the world and install the result
    Add {
        /// World constraints (name, name=version or !name)
        #[arg(required = true)]
        packages: Vec<String>,

        /// Timestamp recorded for install scripts
        #[arg(long, env = "SOURCE_DATE_EPOCH", value_name = "SECONDS")]
        source_date_epoch: Option<u64>,
    },

    /// Resolve the world and fetch every package without installing
    Fetch,

    /// List installed packages
    #[command(alias = "ls")]
    List,
}

impl Commands {
    /// Name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Init { .. } => "init",
            Commands::Install { .. } => "install",
            Commands::Add { .. } => "add",
            Commands::Fetch => "fetch",
            Commands::List => "list",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = Cli::try_parse_from([
            "kiln",
            "add",
            "busybox",
            "!sudo",
            "--root",
            "/tmp/root",
            "--jobs",
            "3",
            "--color",
            "never",
        ])
        .unwrap();

        assert_eq!(cli.global.root, Some(PathBuf::from("/tmp/root")));
        assert_eq!(cli.global.jobs, Some(3));
        assert_eq!(cli.global.color, Some(ColorArg::Never));
        match cli.command {
            Commands::Add { packages, .. } => assert_eq!(packages, vec!["busybox", "!sudo"]),
            _ => panic!("expected add"),
        }
    }

    #[test]
    fn init_collects_repositories_and_world() {
        let cli = Cli::try_parse_from([
            "kiln",
            "init",
            "-X",
            "https://dl.example.org/main",
            "--repository",
            "/srv/local",
            "alpine-base",
        ])
        .unwrap();

        match cli.command {
            Commands::Init {
                repositories,
                packages,
            } => {
                assert_eq!(
                    repositories,
                    vec!["https://dl.example.org/main", "/srv/local"]
                );
                assert_eq!(packages, vec!["alpine-base"]);
            }
            _ => panic!("expected init"),
        }
    }

    #[test]
    fn add_requires_packages() {
        assert!(Cli::try_parse_from(["kiln", "add"]).is_err());
    }

    #[test]
    fn install_takes_an_explicit_epoch() {
        let cli =
            Cli::try_parse_from(["kiln", "install", "--source-date-epoch", "1700000000"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Install {
                source_date_epoch: Some(1_700_000_000)
            }
        ));
        assert_eq!(cli.command.name(), "install");
    }
}
