use acvt_core::{humanize_key, ApprovalFilter, ComplaintSummary};
use acvt_sync::{init_tracing, refresh_once, report_markdown, ConsoleConfig};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::warn;

#[derive(Debug, Parser)]
#[command(name = "acvt")]
#[command(about = "Asset Complaint Vendor Tracker admin console")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the web console.
    Serve,
    /// Fetch and print normalized complaints.
    Complaints {
        /// all, pending_ats, pending_assistant_manager, pending_manager, approved or rejected
        #[arg(long)]
        approval: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Print backend admin statistics.
    Stats,
    /// Print a markdown brief of the current complaints.
    Report,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = ConsoleConfig::from_env().context("loading console configuration")?;
    init_tracing(&config.logging);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => acvt_web::serve(config).await?,
        Commands::Complaints { approval, json } => {
            let (_, snapshot) = refresh_once(&config).await?;
            let filter = ApprovalFilter::parse(approval.as_deref().unwrap_or_default());
            let rows = filter.apply(&snapshot.complaints);
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                for c in &rows {
                    println!(
                        "{:<10} {:<12} {:<26} {:<7} {}",
                        c.id,
                        c.status.as_str(),
                        c.approval_stage.as_str(),
                        c.priority.as_str(),
                        c.title
                    );
                }
                let summary = ComplaintSummary::from_complaints(&rows);
                println!(
                    "shown={} pending_approval={} in_progress={} resolved={} filter={}",
                    summary.total,
                    summary.pending_approval,
                    summary.in_progress,
                    summary.resolved,
                    filter.as_str()
                );
            }
        }
        Commands::Stats => {
            let backend = config.build_backend()?;
            let stats = backend
                .statistics()
                .await
                .map_err(|err| anyhow::anyhow!(err.user_message("statistics")))?;
            println!(
                "employees={} assets={} complaints={} vendors={}",
                stats.counts.employees, stats.counts.assets, stats.counts.complaints, stats.counts.vendors
            );
            println!(
                "active={} ats={} assistant_manager={} manager={}",
                stats.active_complaints,
                stats.ats_complaints,
                stats.assistant_manager_complaints,
                stats.manager_complaints
            );
            for (key, count) in &stats.complaint_status {
                println!("complaint status {}: {}", humanize_key(key), count);
            }
        }
        Commands::Report => {
            let (feed, snapshot) = refresh_once(&config).await?;
            let stats = match feed.backend().statistics().await {
                Ok(stats) => Some(stats),
                Err(err) => {
                    warn!(error = %err, "statistics unavailable, reporting complaints only");
                    None
                }
            };
            println!("{}", report_markdown(&snapshot, stats.as_ref()));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_serve() {
        let cli = Cli::parse_from(["acvt"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn parses_complaints_flags() {
        let cli = Cli::parse_from(["acvt", "complaints", "--approval", "rejected", "--json"]);
        match cli.command {
            Some(Commands::Complaints { approval, json }) => {
                assert_eq!(approval.as_deref(), Some("rejected"));
                assert!(json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
