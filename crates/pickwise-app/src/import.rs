// Ranking import: reads a CSV export (best team first) into an ordered list
// of team ids.
//
// The team column is found by header name (`team`, `team number`,
// `team_number`, `teamnumber`, case-insensitive); without one, the first
// column is used. Rows whose team cell is blank are skipped.

use std::io::Read;
use std::path::Path;

use pickwise_core::TeamId;
use tracing::warn;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("failed to read file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: String, source: csv::Error },

    #[error("{path} has no team rows")]
    Empty { path: String },
}

const TEAM_HEADERS: &[&str] = &["team", "team number", "team_number", "teamnumber"];

fn team_column(headers: &csv::StringRecord) -> usize {
    headers
        .iter()
        .position(|h| TEAM_HEADERS.contains(&h.trim().to_ascii_lowercase().as_str()))
        .unwrap_or(0)
}

fn load_ranking_from_reader<R: Read>(rdr: R) -> Result<Vec<TeamId>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(rdr);
    let column = team_column(reader.headers()?);

    let mut teams: Vec<TeamId> = Vec::new();
    for (line, result) in reader.records().enumerate() {
        match result {
            Ok(record) => {
                let Some(team) = record.get(column).and_then(TeamId::parse) else {
                    continue;
                };
                if teams.contains(&team) {
                    warn!("duplicate team {} in ranking row {}, keeping first", team, line + 2);
                    continue;
                }
                teams.push(team);
            }
            Err(e) => {
                warn!("skipping malformed ranking row: {}", e);
            }
        }
    }
    Ok(teams)
}

/// Load a ranking export, preserving row order.
pub fn load_ranking(path: &Path) -> Result<Vec<TeamId>, ImportError> {
    let file = std::fs::File::open(path).map_err(|e| ImportError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let teams = load_ranking_from_reader(file).map_err(|e| ImportError::Csv {
        path: path.display().to_string(),
        source: e,
    })?;
    if teams.is_empty() {
        return Err(ImportError::Empty {
            path: path.display().to_string(),
        });
    }
    Ok(teams)
}
