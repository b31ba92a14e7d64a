use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "simplomon")]
#[command(version = concat!("Ver:", env!("CARGO_PKG_VERSION")))]
#[command(about = "Blackbox monitoring daemon")]
pub struct Cli {
    /// Path or URL to the TOML configuration document. Falls back to
    /// `$SIMPLOMON_CONFIG_URL`, then `./simplomon.toml`.
    pub config: Option<String>,

    /// Run exactly one measurement cycle, then exit.
    #[arg(long = "once")]
    pub once: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
