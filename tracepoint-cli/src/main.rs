use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tracepoint_core::{DeviceQuery, ScanQuery, TelemetryService};
use tracepoint_store::{StorageConfig, TableCreation};
use tracepoint_types::DeviceSnapshot;

#[derive(Parser)]
#[command(name = "tracepoint", about = "Inspect the device telemetry store")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the device table if it does not exist yet.
    EnsureTable,
    /// Print `partitionKey rowKey computerName` for every matching snapshot.
    Entities(Filters),
    /// Print the latest snapshot of each device, newest first, with its network protection.
    Latest(Filters),
    /// Scan the blob container for one document per device, as JSON lines.
    Scan {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        device_id: Option<String>,
        #[arg(long)]
        computer_name: Option<String>,
        #[arg(long)]
        logged_user: Option<String>,
    },
    /// Print the container's virtual directories.
    Dirs,
}

#[derive(Args)]
struct Filters {
    #[arg(long)]
    device_id: Option<String>,
    #[arg(long)]
    computer_name: Option<String>,
    #[arg(long)]
    logged_user: Option<String>,
    #[arg(long)]
    date_from: Option<String>,
    #[arg(long)]
    date_to: Option<String>,
}

impl From<Filters> for DeviceQuery {
    fn from(f: Filters) -> Self {
        DeviceQuery {
            device_id: f.device_id,
            computer_name: f.computer_name,
            logged_user: f.logged_user,
            date_from: f.date_from,
            date_to: f.date_to,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let storage = StorageConfig::load()?;
    let telemetry = TelemetryService::from_config(&storage)?;

    match cli.command {
        Command::EnsureTable => match telemetry.ensure_table().await? {
            TableCreation::Created => println!("Table \"{}\" created", storage.table_name),
            TableCreation::AlreadyExists => println!("Table \"{}\" already exists.", storage.table_name),
        },
        Command::Entities(filters) => {
            let rows = telemetry.devices(&filters.into()).await?;
            for row in &rows {
                println!("{}", entity_line(row));
            }
            info!(rows = rows.len(), "Listed entities");
        }
        Command::Latest(filters) => {
            let mut rows = telemetry.latest_status(&filters.into()).await?;
            newest_first(&mut rows);
            for row in &rows {
                println!("{}", latest_line(row));
            }
        }
        Command::Scan {
            from,
            to,
            device_id,
            computer_name,
            logged_user,
        } => {
            let query = ScanQuery {
                date_from: Some(from),
                date_to: Some(to),
                device_id,
                computer_name,
                logged_user,
            };
            for doc in telemetry.scan(&query).await? {
                println!("{}", serde_json::to_string(&doc)?);
            }
        }
        Command::Dirs => {
            for dir in telemetry.directories().await? {
                println!("{dir}");
            }
        }
    }

    Ok(())
}

fn entity_line(row: &DeviceSnapshot) -> String {
    format!(
        "{} {} {}",
        row.partition_key,
        row.row_key,
        row.computer_name.as_deref().unwrap_or("-")
    )
}

/// Entity line followed by the device's network protection state.
fn latest_line(row: &DeviceSnapshot) -> String {
    match row.network_protection {
        Some(status) => format!("{} {status}", entity_line(row)),
        None => format!("{} -", entity_line(row)),
    }
}

fn newest_first(rows: &mut [DeviceSnapshot]) {
    rows.sort_by(|a, b| b.partition_key.cmp(&a.partition_key));
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracepoint_types::ProtectionStatus;

    fn snapshot(row_key: &str, partition_key: &str) -> DeviceSnapshot {
        DeviceSnapshot {
            row_key: row_key.into(),
            partition_key: partition_key.into(),
            ..DeviceSnapshot::default()
        }
    }

    #[test]
    fn latest_rows_sort_newest_first() {
        let mut rows = vec![snapshot("a", "2025-01-01"), snapshot("b", "2025-01-03"), snapshot("c", "2025-01-02")];
        newest_first(&mut rows);
        let keys: Vec<&str> = rows.iter().map(|r| r.row_key.as_str()).collect();
        assert_eq!(keys, vec!["b", "c", "a"]);
    }

    #[test]
    fn entity_line_marks_missing_computer_name() {
        let mut row = snapshot("d1", "2025-01-01");
        assert_eq!(entity_line(&row), "2025-01-01 d1 -");
        row.computer_name = Some("WS-1".into());
        assert_eq!(entity_line(&row), "2025-01-01 d1 WS-1");
    }

    #[test]
    fn latest_line_shows_network_protection() {
        let mut row = snapshot("d1", "2025-01-03");
        row.computer_name = Some("WS-1".into());
        assert_eq!(latest_line(&row), "2025-01-03 d1 WS-1 -");
        row.network_protection = Some(ProtectionStatus::Block);
        assert_eq!(latest_line(&row), "2025-01-03 d1 WS-1 Block (1)");
        row.network_protection = Some(ProtectionStatus::from_code(3));
        assert_eq!(latest_line(&row), "2025-01-03 d1 WS-1 Unknown (3)");
    }

    #[test]
    fn scan_requires_bounds() {
        assert!(Cli::try_parse_from(["tracepoint", "scan", "--from", "2025-05-01"]).is_err());
        let cli = Cli::try_parse_from(["tracepoint", "latest", "--computer-name", "WS"]).unwrap();
        assert!(matches!(cli.command, Command::Latest(Filters { computer_name: Some(_), .. })));
    }
}
