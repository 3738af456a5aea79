use anyhow::{Context, bail};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use snowmill::{MAX_MACHINE_ID, SnowflakeGenerator, SnowflakeId};

/// Runtime configuration for the `snowmill` binary.
///
/// The generator identity (machine ID and start time) is parsed from CLI
/// arguments or environment variables. Both must match what the rest of the
/// deployment uses, otherwise decoded timestamps are meaningless.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "snowmill",
    version,
    about = "Generate and decode 64-bit Snowflake IDs"
)]
pub struct CliArgs {
    /// Machine ID embedded in every generated ID (0-511).
    ///
    /// Must be unique per generating process across the deployment.
    ///
    /// Environment variable: `SNOWMILL_MACHINE_ID`
    #[arg(long, env = "SNOWMILL_MACHINE_ID", default_value_t = 0, global = true)]
    pub machine_id: u16,

    /// Start time (epoch) that ID timestamps are measured from, in RFC 3339.
    ///
    /// Environment variable: `SNOWMILL_START_TIME`
    #[arg(
        long,
        env = "SNOWMILL_START_TIME",
        default_value = "2008-11-10T23:00:00Z",
        global = true
    )]
    pub start_time: DateTime<Utc>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Generate new IDs, one per line.
    Generate {
        /// Number of IDs to generate.
        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,

        /// Print each ID with its decoded components as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Decode existing IDs into timestamp, machine ID and sequence.
    Parse {
        /// IDs to decode, as decimal integers.
        #[arg(required = true)]
        ids: Vec<SnowflakeId>,

        /// Print JSON instead of tab-separated fields.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub machine_id: u16,
    pub start_time: DateTime<Utc>,
    pub command: Command,
}

impl TryFrom<CliArgs> for Config {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.machine_id > MAX_MACHINE_ID {
            bail!(
                "SNOWMILL_MACHINE_ID ({}) exceeds the machine ID space (max = {})",
                args.machine_id,
                MAX_MACHINE_ID
            );
        }

        if let Command::Generate { count: 0, .. } = args.command {
            bail!("--count must be greater than 0");
        }

        Ok(Self {
            machine_id: args.machine_id,
            start_time: args.start_time,
            command: args.command,
        })
    }
}

impl Config {
    /// Builds a generator carrying this configuration's identity.
    pub fn generator(&self) -> anyhow::Result<SnowflakeGenerator> {
        let mut generator = SnowflakeGenerator::new();
        generator
            .try_set_start_time(self.start_time)
            .context("invalid SNOWMILL_START_TIME")?;
        generator
            .try_set_machine_id(self.machine_id)
            .context("invalid SNOWMILL_MACHINE_ID")?;
        Ok(generator)
    }
}
