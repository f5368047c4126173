use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::allocation::compensation::{CompensationDelta, CompensationLedger};
use crate::allocation::types::{Allocation, Party, Session};

/// Formats a party as `id (size)`, marking token holders
pub fn format_party(party: &Party) -> String {
    if party.golden_die {
        format!("{} ({}) [golden die]", party.id, party.size)
    } else {
        format!("{} ({})", party.id, party.size)
    }
}

/// Prints the allocation grouped by session
pub fn print_allocation(allocation: &Allocation, sessions: &[Session], parties: &[Party]) {
    let counts = allocation.player_counts(sessions, parties);

    println!("\n=== Allocation (trial {}, seed {}) ===", allocation.trial, allocation.seed);
    println!(
        "Loss: {} ({} cancelled sessions)",
        allocation.loss.value, allocation.loss.cancelled_sessions
    );

    for session in sessions {
        let players = counts.get(&session.id).copied().unwrap_or(0);
        let status = if allocation.cancelled_sessions.contains(&session.id) {
            " CANCELLED"
        } else if players == 0 {
            " [EMPTY]"
        } else {
            ""
        };
        println!(
            "\n{} ({}/{}/{}) -> {} players{}",
            session.id, session.min_players, session.opt_players, session.max_players, players, status
        );
        if let Some(gm) = &session.gamemaster {
            println!("  GM: {}", gm.id);
        }

        for assignment in allocation.assignments.iter().filter(|a| a.session_id.as_ref() == Some(&session.id)) {
            let tier = assignment.tier.map(|t| t.to_string()).unwrap_or_default();
            if let Some(party) = parties.iter().find(|p| p.id == assignment.party_id) {
                println!("  - {} at {}", format_party(party), tier);
            }
        }
        for seat in allocation.gamemasters.iter().filter(|g| g.session_id.as_ref() == Some(&session.id)) {
            println!("  - GM {} (from {})", seat.gamemaster_id, seat.cancelled_session);
        }
    }

    let unassigned = allocation.unassigned();
    if !unassigned.is_empty() {
        println!("\n⚠️  Unassigned parties ({}):", unassigned.len());
        for party_id in unassigned {
            println!("  - {}", party_id);
        }
    }

    for seat in allocation.gamemasters.iter().filter(|g| g.session_id.is_none()) {
        println!("⚠️  GM {} of cancelled session {} has no table", seat.gamemaster_id, seat.cancelled_session);
    }

    if !allocation.displacements.is_empty() {
        println!("\nDisplacements ({}):", allocation.displacements.len());
        for bump in &allocation.displacements {
            println!(
                "  {} moved {} -> {} ({} -> {}) for {}",
                bump.party_id, bump.from_session, bump.to_session, bump.tier_before, bump.tier_after, bump.displaced_by
            );
        }
    }

    if !allocation.tokens_spent.is_empty() {
        println!("\nGolden dice spent: {}", allocation.tokens_spent.join(", "));
    }
}

/// Prints the compensation changes an allocation produced
pub fn print_compensation(delta: &CompensationDelta) {
    println!("\n=== Compensation ===");
    for (party, change) in delta.players.iter().filter(|(_, c)| **c != 0) {
        println!("  player {}: {:+}", party, change);
    }
    for (gm, change) in delta.gamemasters.iter().filter(|(_, c)| **c != 0) {
        let note = if delta.virtual_penalties.contains_key(gm) { " (virtual)" } else { "" };
        println!("  gm {}: {:+}{}", gm, change, note);
    }
    println!("Total: {:+} (real {:+})", delta.total(), delta.real_total());
}

/// Exported result file
#[derive(Debug, Serialize, Deserialize)]
pub struct ResultFile {
    pub generated_at: DateTime<Utc>,
    pub allocation: Allocation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compensation: Option<CompensationDelta>,
}

/// Writes the allocation as pretty JSON
pub fn write_results_json<P: AsRef<Path>>(
    path: P,
    allocation: &Allocation,
    compensation: Option<&CompensationDelta>,
) -> Result<(), Box<dyn std::error::Error>> {
    let file = ResultFile {
        generated_at: Utc::now(),
        allocation: allocation.clone(),
        compensation: compensation.cloned(),
    };
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, &file)?;
    writer.flush()?;
    Ok(())
}

/// Writes one row per party: `party_id,session_id,tier`.
/// Unassigned parties get empty session and tier columns.
pub fn write_results_csv<P: AsRef<Path>>(path: P, allocation: &Allocation) -> Result<(), Box<dyn std::error::Error>> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["party_id", "session_id", "tier"])?;

    for assignment in &allocation.assignments {
        let tier = assignment.tier.map(|t| t.to_string()).unwrap_or_default();
        writer.write_record([
            assignment.party_id.as_str(),
            assignment.session_id.as_deref().unwrap_or(""),
            tier.as_str(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

/// Loads a ledger, or an empty one if the file does not exist yet
pub fn load_ledger<P: AsRef<Path>>(path: P) -> Result<CompensationLedger, Box<dyn std::error::Error>> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(CompensationLedger::default());
    }
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

pub fn save_ledger<P: AsRef<Path>>(path: P, ledger: &CompensationLedger) -> Result<(), Box<dyn std::error::Error>> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, ledger)?;
    writer.flush()?;
    Ok(())
}
