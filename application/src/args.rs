//! [`Args`] definitions.

use clap::Parser;

/// Reservation and payment reconciliation server of the travel marketplace.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Path to the configuration file.
    ///
    /// Missing file is fine: `CONF.*` environment variables and defaults are
    /// used then.
    #[arg(short, long, env = "CONF_FILE", default_value = "config.toml")]
    pub config: String,
}

impl Args {
    /// Parses command line arguments.
    ///
    /// # Errors
    ///
    /// Errors if failed to parse command line arguments.
    pub fn parse() -> Result<Self, clap::Error> {
        <Self as Parser>::try_parse()
    }
}

#[cfg(test)]
mod spec {
    use clap::Parser as _;

    use super::Args;

    #[test]
    fn reads_config_path() {
        let args =
            Args::try_parse_from(["server", "--config", "prod.toml"]).unwrap();
        assert_eq!(args.config, "prod.toml");

        assert!(Args::try_parse_from(["server", "--unknown"]).is_err());
    }
}
