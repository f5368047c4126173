use csv::{Reader, StringRecord};
use std::collections::BTreeMap;
use std::path::Path;

use crate::allocation::types::{Gamemaster, Party, Session, SessionId};

/// Parses a boolean value from various string representations
fn parse_bool(value: &str) -> bool {
    let lower = value.trim().to_lowercase();
    lower == "yes" || lower == "true" || lower == "1" || lower == "y"
}

/// Parses a number, returning 0 if empty
fn parse_number<T: std::str::FromStr + Default>(value: &str, field: &str) -> Result<T, Box<dyn std::error::Error>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(T::default());
    }
    trimmed
        .parse()
        .map_err(|_| format!("invalid number '{}' in column {}", trimmed, field).into())
}

/// Parses a preference list such as `s1=5; s2=0; s3=4`.
/// Entries without `=` or with an empty session id are skipped.
pub fn parse_preferences(value: &str) -> Result<BTreeMap<SessionId, u8>, Box<dyn std::error::Error>> {
    let mut preferences = BTreeMap::new();

    for part in value.split(';') {
        let Some((session, rating)) = part.split_once('=') else { continue };
        let session = session.trim();
        if session.is_empty() {
            continue;
        }
        let rating: u8 = rating
            .trim()
            .parse()
            .map_err(|_| format!("invalid preference '{}' for session {}", rating.trim(), session))?;
        preferences.insert(session.to_string(), rating);
    }

    Ok(preferences)
}

/// Inverse of `parse_preferences`
pub fn format_preferences(preferences: &BTreeMap<SessionId, u8>) -> String {
    preferences
        .iter()
        .map(|(session, rating)| format!("{}={}", session, rating))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Column lookup by header name, case-insensitive
struct Columns {
    headers: Vec<String>,
}

impl Columns {
    fn new(headers: &StringRecord) -> Self {
        Columns {
            headers: headers.iter().map(|h| h.trim().to_lowercase()).collect(),
        }
    }

    fn find(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    fn require(&self, name: &str) -> Result<usize, Box<dyn std::error::Error>> {
        self.find(name).ok_or_else(|| format!("missing column '{}'", name).into())
    }
}

fn field<'r>(record: &'r StringRecord, column: Option<usize>) -> &'r str {
    column.and_then(|c| record.get(c)).unwrap_or("").trim()
}

/// Loads sessions from a CSV file.
///
/// Required columns: `session_id`, `min_players`, `opt_players`, `max_players`.
/// Optional: `gm_id`, `gm_compensation`, `gm_preferences`, `overflow`.
pub fn load_sessions<P: AsRef<Path>>(csv_path: P) -> Result<Vec<Session>, Box<dyn std::error::Error>> {
    let mut reader = Reader::from_path(csv_path)?;
    let columns = Columns::new(reader.headers()?);

    let id_col = columns.require("session_id")?;
    let min_col = columns.require("min_players")?;
    let opt_col = columns.require("opt_players")?;
    let max_col = columns.require("max_players")?;
    let gm_col = columns.find("gm_id");
    let gm_comp_col = columns.find("gm_compensation");
    let gm_prefs_col = columns.find("gm_preferences");
    let overflow_col = columns.find("overflow");

    let mut sessions = Vec::new();
    for result in reader.records() {
        let record = result?;

        let id = field(&record, Some(id_col));
        // Skip blank lines
        if id.is_empty() {
            continue;
        }

        let gm_id = field(&record, gm_col);
        let gamemaster = if gm_id.is_empty() {
            None
        } else {
            Some(Gamemaster {
                id: gm_id.to_string(),
                compensation: parse_number(field(&record, gm_comp_col), "gm_compensation")?,
                preferences: parse_preferences(field(&record, gm_prefs_col))?,
            })
        };

        sessions.push(Session {
            id: id.to_string(),
            min_players: parse_number(field(&record, Some(min_col)), "min_players")?,
            opt_players: parse_number(field(&record, Some(opt_col)), "opt_players")?,
            max_players: parse_number(field(&record, Some(max_col)), "max_players")?,
            gamemaster,
            overflow: parse_bool(field(&record, overflow_col)),
        });
    }

    Ok(sessions)
}

/// Loads parties from a CSV file.
///
/// Required columns: `party_id`, `size`.
/// Optional: `golden_die`, `compensation`, `preferences`.
pub fn load_parties<P: AsRef<Path>>(csv_path: P) -> Result<Vec<Party>, Box<dyn std::error::Error>> {
    let mut reader = Reader::from_path(csv_path)?;
    let columns = Columns::new(reader.headers()?);

    let id_col = columns.require("party_id")?;
    let size_col = columns.require("size")?;
    let golden_col = columns.find("golden_die");
    let comp_col = columns.find("compensation");
    let prefs_col = columns.find("preferences");

    let mut parties = Vec::new();
    for result in reader.records() {
        let record = result?;

        let id = field(&record, Some(id_col));
        if id.is_empty() {
            continue;
        }

        parties.push(Party {
            id: id.to_string(),
            size: parse_number(field(&record, Some(size_col)), "size")?,
            preferences: parse_preferences(field(&record, prefs_col))?,
            golden_die: parse_bool(field(&record, golden_col)),
            compensation: parse_number(field(&record, comp_col), "compensation")?,
        });
    }

    Ok(parties)
}

/// Writes sessions in the format `load_sessions` reads
pub fn write_sessions<P: AsRef<Path>>(csv_path: P, sessions: &[Session]) -> Result<(), Box<dyn std::error::Error>> {
    let mut writer = csv::Writer::from_path(csv_path)?;
    writer.write_record([
        "session_id",
        "min_players",
        "opt_players",
        "max_players",
        "gm_id",
        "gm_compensation",
        "gm_preferences",
        "overflow",
    ])?;

    for session in sessions {
        let (gm_id, gm_comp, gm_prefs) = match &session.gamemaster {
            Some(gm) => (gm.id.clone(), gm.compensation.to_string(), format_preferences(&gm.preferences)),
            None => (String::new(), String::new(), String::new()),
        };
        writer.write_record([
            session.id.clone(),
            session.min_players.to_string(),
            session.opt_players.to_string(),
            session.max_players.to_string(),
            gm_id,
            gm_comp,
            gm_prefs,
            session.overflow.to_string(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

/// Writes parties in the format `load_parties` reads
pub fn write_parties<P: AsRef<Path>>(csv_path: P, parties: &[Party]) -> Result<(), Box<dyn std::error::Error>> {
    let mut writer = csv::Writer::from_path(csv_path)?;
    writer.write_record(["party_id", "size", "golden_die", "compensation", "preferences"])?;

    for party in parties {
        writer.write_record([
            party.id.clone(),
            party.size.to_string(),
            party.golden_die.to_string(),
            party.compensation.to_string(),
            format_preferences(&party.preferences),
        ])?;
    }

    writer.flush()?;
    Ok(())
}
