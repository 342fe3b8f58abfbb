// Line-oriented command parsing.
//
// One command per line. Arguments are separated by whitespace; wrap list
// names containing spaces in double quotes. `""` is an empty argument, which
// for `remove` means "the whole list".

use std::path::PathBuf;

use pickwise_core::TeamId;
use thiserror::Error;

/// Commands the app loop understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    Lists,
    Show { list: String },
    Create { list: String },
    /// Place `team` after `after` (or at the top).
    Add {
        list: String,
        team: TeamId,
        after: Option<TeamId>,
    },
    /// `team == None` deletes the whole list.
    Remove { list: String, team: Option<TeamId> },
    Delete { list: String },
    Rename { from: String, to: String },
    Strike { team: TeamId },
    Belongs { team: TeamId },
    Import { list: String, path: PathBuf },
    Prune,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unknown command `{0}` (try `help`)")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("`{0}` is not a team number")]
    InvalidTeam(String),

    #[error("unterminated quote")]
    UnterminatedQuote,
}

pub const HELP: &str = "\
commands:
  lists                       list names with team counts
  show <list>                 teams in a list, in order
  create <list>               new empty list
  add <list> <team> [after]   insert or move team (after another, else top)
  remove <list> <team>        take a team out (\"\" removes the whole list)
  delete <list>               delete a list
  rename <old> <new>          rename a list
  strike <team>               toggle a team's crossed-out mark
  belongs <team>              lists containing a team
  import <list> <csv>         load a ranking export into a list
  prune                       reload, dropping empty lists
  quit";

/// Parse one input line. Blank lines yield `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<UserCommand>, CommandError> {
    let tokens = tokenize(line)?;
    let Some((head, args)) = tokens.split_first() else {
        return Ok(None);
    };

    let cmd = match (head.to_ascii_lowercase().as_str(), args) {
        ("lists" | "ls", []) => UserCommand::Lists,
        ("show", [list]) => UserCommand::Show { list: list.clone() },
        ("create" | "new", [list]) => UserCommand::Create { list: list.clone() },
        ("add", [list, team]) => UserCommand::Add {
            list: list.clone(),
            team: team_arg(team)?,
            after: None,
        },
        ("add", [list, team, after]) => UserCommand::Add {
            list: list.clone(),
            team: team_arg(team)?,
            after: TeamId::parse(after),
        },
        ("remove" | "rm", [list, team]) => UserCommand::Remove {
            list: list.clone(),
            team: TeamId::parse(team),
        },
        ("delete", [list]) => UserCommand::Delete { list: list.clone() },
        ("rename", [from, to]) => UserCommand::Rename {
            from: from.clone(),
            to: to.clone(),
        },
        ("strike", [team]) => UserCommand::Strike {
            team: team_arg(team)?,
        },
        ("belongs", [team]) => UserCommand::Belongs {
            team: team_arg(team)?,
        },
        ("import", [list, path]) => UserCommand::Import {
            list: list.clone(),
            path: PathBuf::from(path),
        },
        ("prune", []) => UserCommand::Prune,
        ("help" | "?", _) => UserCommand::Help,
        ("quit" | "exit" | "q", []) => UserCommand::Quit,
        (name, _) => return Err(usage_for(name)),
    };
    Ok(Some(cmd))
}

fn usage_for(name: &str) -> CommandError {
    let usage = match name {
        "lists" | "ls" => "lists",
        "show" => "show <list>",
        "create" | "new" => "create <list>",
        "add" => "add <list> <team> [after]",
        "remove" | "rm" => "remove <list> <team>",
        "delete" => "delete <list>",
        "rename" => "rename <old> <new>",
        "strike" => "strike <team>",
        "belongs" => "belongs <team>",
        "import" => "import <list> <csv>",
        "prune" => "prune",
        "quit" | "exit" | "q" => "quit",
        other => return CommandError::Unknown(other.to_string()),
    };
    CommandError::Usage(usage)
}

fn team_arg(raw: &str) -> Result<TeamId, CommandError> {
    TeamId::parse(raw).ok_or_else(|| CommandError::InvalidTeam(raw.to_string()))
}

/// Split on whitespace, keeping double-quoted runs together.
fn tokenize(line: &str) -> Result<Vec<String>, CommandError> {
    let mut tokens = Vec::new();
    let mut chars = line.trim().chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        let mut token = String::new();
        if c == '"' {
            chars.next();
            loop {
                match chars.next() {
                    Some('"') => break,
                    Some(ch) => token.push(ch),
                    None => return Err(CommandError::UnterminatedQuote),
                }
            }
        } else {
            while let Some(&ch) = chars.peek() {
                if ch.is_whitespace() {
                    break;
                }
                token.push(ch);
                chars.next();
            }
        }
        tokens.push(token);
    }

    Ok(tokens)
}
