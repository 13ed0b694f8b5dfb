use super::config::{default_config_path, BotConfig};
use lazy_consensus::chat::UserId;
use lazy_consensus::grants::Proposal;
use lazy_consensus::persistence::{GrantRepository, SqliteGrantRepository};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub proposals: Vec<Proposal>,
    pub granted: Vec<GrantedTotal>,
}

#[derive(Debug, Serialize)]
pub struct GrantedTotal {
    pub beneficiary: UserId,
    pub total: u64,
}

/// Show active proposals and granted totals
///
/// Reads the database named in the config. Safe to run next to a live bot;
/// it only reads.
pub async fn execute(
    config_path: Option<String>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = config_path
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);
    let config = BotConfig::load(&config_path)?;

    let report = collect(&config.database.path).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render(&report));
    }
    Ok(())
}

pub async fn collect(database: &std::path::Path) -> Result<StatusReport, Box<dyn std::error::Error>> {
    if !database.exists() {
        return Err(format!("Database '{}' does not exist yet", database.display()).into());
    }

    let repository = SqliteGrantRepository::open(database).await?;
    let mut proposals = repository.load_proposals().await?;
    proposals.sort_by_key(|proposal| proposal.created_at);
    let granted = repository
        .granted_totals()
        .await?
        .into_iter()
        .map(|(beneficiary, total)| GrantedTotal { beneficiary, total })
        .collect();
    repository.close().await;

    Ok(StatusReport { proposals, granted })
}

fn render(report: &StatusReport) -> String {
    let mut out = String::from("📊 Lazy Consensus Bot Status\n\n");

    if report.proposals.is_empty() {
        out.push_str("No active proposals\n");
    } else {
        out.push_str(&format!("Active proposals: {}\n", report.proposals.len()));
        for proposal in &report.proposals {
            let remaining = humantime::format_duration(Duration::from_secs(proposal.timer_secs));
            out.push_str(&format!(
                "  {}  {} points for {} by {}  remaining {}  opposing votes {}\n",
                proposal.voting_message_id,
                proposal.amount,
                proposal.beneficiary,
                proposal.author,
                remaining,
                proposal.vote_count()
            ));
        }
    }

    out.push('\n');
    if report.granted.is_empty() {
        out.push_str("No points granted yet\n");
    } else {
        out.push_str("Granted points:\n");
        for entry in &report.granted {
            out.push_str(&format!("  {}  {}\n", entry.beneficiary, entry.total));
        }
    }
    out
}
