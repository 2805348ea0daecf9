use clap::{Parser, Subcommand};

/// Build, flash and test the crank power meter firmware.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build power-meter-app for the nRF52840
    Build {
        /// Extra power-meter-app features, e.g. "defmt"
        #[arg(long)]
        features: Option<String>,

        #[arg(long)]
        release: bool,
    },
    /// Build power-meter-app and write it with probe-rs
    Flash {
        /// Extra power-meter-app features, e.g. "defmt"
        #[arg(long)]
        features: Option<String>,

        #[arg(long)]
        release: bool,

        /// Erase the whole chip before writing
        #[arg(long)]
        force: bool,
    },
    /// Flash, then follow the defmt log over RTT
    Run {
        /// Extra power-meter-app features, e.g. "defmt"
        #[arg(long)]
        features: Option<String>,

        #[arg(long)]
        release: bool,
    },
    /// Follow the defmt log of a running meter over RTT
    Attach {
        #[arg(long)]
        release: bool,
    },
    /// Run the host tests of power-meter-core, power-meter-icd and the drivers
    Test {
        /// Only test this package
        #[arg(short, long)]
        package: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_takes_an_optional_package() {
        let cli = Cli::parse_from(["xtask", "test", "-p", "power-meter-core"]);
        match cli.command {
            Commands::Test { package } => {
                assert_eq!(package.as_deref(), Some("power-meter-core"))
            }
            _ => panic!("expected the test command"),
        }

        let cli = Cli::parse_from(["xtask", "test"]);
        assert!(matches!(cli.command, Commands::Test { package: None }));
    }

    #[test]
    fn flash_flags() {
        let cli = Cli::parse_from([
            "xtask",
            "flash",
            "--release",
            "--features",
            "defmt",
        ]);
        match cli.command {
            Commands::Flash { features, release, force } => {
                assert_eq!(features.as_deref(), Some("defmt"));
                assert!(release);
                assert!(!force);
            }
            _ => panic!("expected the flash command"),
        }
    }
}
