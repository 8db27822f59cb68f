use clap::{ArgAction, Parser};

#[derive(Parser, Debug)]
#[command(name = "fleet-agent", version, about, long_about = None)]
pub struct Cli {
    /// Id of the machine this agent runs on (e.g. `0` or `0/lxc/1`)
    #[arg(long, env = "FLEET_MACHINE_ID")]
    pub machine_id: Option<String>,

    /// Units hosted on the machine, comma separated (e.g. `wordpress/0,mysql/1`)
    #[arg(long, env = "FLEET_UNITS", value_delimiter = ',')]
    pub units: Vec<String>,

    /// Leadership lease length in seconds
    #[arg(long, env = "FLEET_LEASE_SECS")]
    pub lease_secs: Option<u64>,

    /// Seconds between claims while another unit leads
    #[arg(long, env = "FLEET_RETRY_SECS")]
    pub retry_secs: Option<u64>,

    /// Verbose mode (-v, -vv, -vvv)
    #[arg(short, action = ArgAction::Count)]
    pub verbosity: u8,
}

impl Cli {
    /// Log filter directive for the chosen verbosity.
    pub fn log_directive(&self) -> &'static str {
        match self.verbosity {
            0 => "fleet=info,coord=info",
            1 => "fleet=debug,coord=debug",
            _ => "fleet=trace,coord=trace",
        }
    }
}
