use std::io::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;
use snowmill::{ParsedId, SnowflakeId};

use crate::config::{Command, Config};

/// One decoded ID as printed by `--json`.
#[derive(Serialize, Debug)]
struct IdReport {
    #[serde(flatten)]
    parsed: ParsedId,
    generated_at: DateTime<Utc>,
}

impl IdReport {
    fn new(id: SnowflakeId, start_time: DateTime<Utc>) -> Self {
        let parsed = id.parse();
        Self {
            generated_at: parsed.generate_time(start_time),
            parsed,
        }
    }

    fn write_to<W: Write>(&self, out: &mut W, json: bool) -> anyhow::Result<()> {
        if json {
            serde_json::to_writer(&mut *out, self)?;
            writeln!(out)?;
        } else {
            writeln!(
                out,
                "{}\ttimestamp={}\tmachine_id={}\tsequence={}\tgenerated_at={}",
                self.parsed.id,
                self.parsed.timestamp,
                self.parsed.machine_id,
                self.parsed.sequence,
                self.generated_at.to_rfc3339(),
            )?;
        }
        Ok(())
    }
}

/// Executes the configured subcommand, writing results to `out`.
pub fn run<W: Write>(config: &Config, out: &mut W) -> anyhow::Result<()> {
    match &config.command {
        Command::Generate { count, json } => {
            let generator = config.generator()?;
            for _ in 0..*count {
                let id = generator.next_snowflake_id()?;
                if *json {
                    IdReport::new(id, config.start_time).write_to(out, true)?;
                } else {
                    writeln!(out, "{id}")?;
                }
            }
            tracing::info!(
                count,
                machine_id = config.machine_id,
                "generated IDs"
            );
        }
        Command::Parse { ids, json } => {
            for id in ids {
                IdReport::new(*id, config.start_time).write_to(out, *json)?;
            }
        }
    }
    Ok(())
}
