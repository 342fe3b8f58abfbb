// Application state and the command loop.
//
// One task owns the EventSession and processes commands one at a time. Each
// command produces a text response; each persisted change is forwarded to the
// UI as it is published by the session.

use std::fmt::Write as _;

use pickwise_core::config::Config;
use pickwise_core::db::Database;
use pickwise_core::persist::PicklistPersistence;
use pickwise_core::{EventSession, PicklistChange, Removal, SessionError};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::command::{UserCommand, HELP};
use crate::import;

// ---------------------------------------------------------------------------
// UI messages
// ---------------------------------------------------------------------------

/// Messages from the app loop to whatever renders output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiUpdate {
    /// Response text for a command.
    Output(String),
    /// A command failed; the message is user-facing.
    Error(String),
    /// The session persisted a change.
    Changed(PicklistChange),
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

pub struct AppState {
    pub config: Config,
    pub session: EventSession<Database>,
}

impl AppState {
    /// Open the configured event on `db`.
    pub fn new(config: Config, db: Database) -> Result<Self, SessionError> {
        let session = EventSession::open(
            &config.event.id,
            PicklistPersistence::new(db),
            config.picklists.removal_policy,
        )?;
        Ok(AppState { config, session })
    }

    pub fn db(&self) -> &Database {
        self.session.persistence().backend()
    }
}

/// Run the command loop until `Quit` arrives or the command channel closes.
pub async fn run(
    mut cmd_rx: mpsc::Receiver<UserCommand>,
    ui_tx: mpsc::Sender<UiUpdate>,
    mut state: AppState,
) -> anyhow::Result<()> {
    info!("Application event loop started");
    let mut change_rx = state.session.subscribe();

    loop {
        tokio::select! {
            // Drain published changes before taking the next command.
            biased;

            Some(change) = change_rx.recv() => {
                let _ = ui_tx.send(UiUpdate::Changed(change)).await;
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(UserCommand::Quit) => {
                        info!("Quit command received, shutting down");
                        break;
                    }
                    Some(cmd) => {
                        let update = match handle_command(&mut state, cmd) {
                            Ok(text) => UiUpdate::Output(text),
                            Err(e) => {
                                warn!("Command failed: {:#}", e);
                                UiUpdate::Error(format!("{:#}", e))
                            }
                        };
                        let _ = ui_tx.send(update).await;
                    }
                    None => {
                        info!("Command channel closed, shutting down");
                        break;
                    }
                }
            }
        }
    }

    // Forward anything published by the last command.
    while let Ok(change) = change_rx.try_recv() {
        let _ = ui_tx.send(UiUpdate::Changed(change)).await;
    }

    info!("Application event loop exiting");
    Ok(())
}

/// Apply one command to the session and render its response.
pub fn handle_command(state: &mut AppState, cmd: UserCommand) -> anyhow::Result<String> {
    let session = &mut state.session;
    match cmd {
        UserCommand::Lists => Ok(render_lists(state)),
        UserCommand::Show { list } => Ok(render_list(session, &list)),
        UserCommand::Create { list } => {
            session.create_list(&list)?;
            Ok(format!("created \"{}\"", list.trim()))
        }
        UserCommand::Add { list, team, after } => {
            session.add_to(&list, after.as_ref(), &team)?;
            Ok(render_list(session, &list))
        }
        UserCommand::Remove { list, team } => {
            let text = match session.remove_team(&list, team.as_ref())? {
                Removal::Team => render_list(session, &list),
                Removal::List => format!("deleted \"{}\"", list.trim()),
                Removal::Absent => format!(
                    "{} is not in \"{}\"",
                    team.as_ref().map_or("(none)", |t| t.as_str()),
                    list.trim()
                ),
                Removal::Anomaly { evicted } => format!(
                    "{} was not in \"{}\"; {} was dropped instead",
                    team.as_ref().map_or("(none)", |t| t.as_str()),
                    list.trim(),
                    evicted
                ),
            };
            Ok(text)
        }
        UserCommand::Delete { list } => {
            let removed = session.remove_list(&list)?;
            Ok(format!(
                "deleted \"{}\" ({} teams)",
                removed.name(),
                removed.len()
            ))
        }
        UserCommand::Rename { from, to } => {
            session.rename_list(&from, &to)?;
            Ok(format!("renamed \"{}\" to \"{}\"", from.trim(), to.trim()))
        }
        UserCommand::Strike { team } => {
            let crossed_out = session.cross_out(&team)?;
            Ok(if crossed_out {
                format!("{team} crossed out")
            } else {
                format!("{team} restored")
            })
        }
        UserCommand::Belongs { team } => {
            let query = session.query();
            let lists = query.lists_containing(&team);
            let mut text = if lists.is_empty() {
                format!("{team} is on no lists")
            } else {
                format!("{team}: {}", lists.join(", "))
            };
            if query.is_crossed_out(&team) {
                text.push_str(" (crossed out)");
            }
            Ok(text)
        }
        UserCommand::Import { list, path } => {
            let teams = import::load_ranking(&path)?;
            let count = teams.len();
            session.save_list(&list, teams)?;
            info!("Imported {} teams from {} into {}", count, path.display(), list);
            Ok(format!("imported {count} teams into \"{}\"", list.trim()))
        }
        UserCommand::Prune => {
            let pruned = session.reload()?;
            Ok(if pruned.lists.is_empty() {
                "nothing to prune".to_string()
            } else {
                format!("pruned {}", pruned.lists.join(", "))
            })
        }
        UserCommand::Help => Ok(HELP.to_string()),
        // The loop handles quit before dispatch.
        UserCommand::Quit => Ok(String::new()),
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Every list with its team count, plus when the event was last saved.
pub fn render_lists(state: &AppState) -> String {
    let session = &state.session;
    let counts = session.query().team_counts();
    let mut out = format!("event {}", session.event_id());

    let key = PicklistPersistence::<Database>::storage_key(session.event_id());
    match state.db().last_saved(&key) {
        Ok(Some(saved_at)) => {
            let _ = write!(out, " (saved {})", saved_at.format("%Y-%m-%d %H:%M:%S UTC"));
        }
        Ok(None) => {}
        Err(e) => warn!("Failed to read save time: {:#}", e),
    }

    if counts.is_empty() {
        out.push_str("\n  no lists");
    }
    for (name, count) in counts {
        let _ = write!(out, "\n  {name} ({count})");
    }
    out
}

/// Teams of `list` in rank order, crossed-out teams marked with `x`.
pub fn render_list(session: &EventSession<Database>, list: &str) -> String {
    let query = session.query();
    let members = query.members(list);
    if members.is_empty() && !session.store().set().contains(list) {
        return format!("no list named \"{}\"", list.trim());
    }

    let mut out = format!("{} ({})", list.trim(), members.len());
    for (idx, team) in members.iter().enumerate() {
        let mark = if query.is_crossed_out(team) { "x" } else { " " };
        let _ = write!(out, "\n  {mark} {:>2}. {team}", idx + 1);
    }
    out
}

/// One-line description of a change, for display.
pub fn describe_change(change: &PicklistChange) -> String {
    match change {
        PicklistChange::Loaded { pruned } if pruned.is_empty() => "reloaded".to_string(),
        PicklistChange::Loaded { pruned } => {
            format!("reloaded, dropped empty: {}", pruned.join(", "))
        }
        PicklistChange::ListCreated { name } => format!("+ {name}"),
        PicklistChange::ListUpdated { name } => format!("~ {name}"),
        PicklistChange::ListRemoved { name } => format!("- {name}"),
        PicklistChange::ListRenamed { from, to } => format!("{from} -> {to}"),
        PicklistChange::CrossOutToggled { team, crossed_out } => {
            format!("{team} {}", if *crossed_out { "struck" } else { "unstruck" })
        }
    }
}
