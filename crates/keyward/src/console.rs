//! Line-oriented operator console.
//!
//! Each input line is one command. Replies start with an HTTP-style status
//! code so scripts can check outcomes the same way a web front end would.

use keyward_core::{AccountManager, Error, InMemoryDirectory, PersistenceProvider};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// A parsed console command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `add <username> <password> <role>[,<role>...]`
    Add {
        /// Login name.
        username: String,
        /// Plain-text password.
        password: String,
        /// Granted roles.
        roles: Vec<String>,
    },
    /// `passwd <username> <password>`
    Passwd {
        /// Login name.
        username: String,
        /// New plain-text password.
        password: String,
    },
    /// `del <username>`
    Delete {
        /// Login name.
        username: String,
    },
    /// `get <username>`
    Get {
        /// Login name.
        username: String,
    },
    /// `auth <username> <password>`
    Auth {
        /// Login name.
        username: String,
        /// Plain-text password.
        password: String,
    },
    /// `list`
    List,
    /// `sweep`
    Sweep,
    /// `help`
    Help,
    /// `quit` / `exit`
    Quit,
}

const USAGE: &str = "commands: add <user> <password> <role,...> | passwd <user> <password> | \
                     del <user> | get <user> | auth <user> <password> | list | sweep | help | quit";

/// Parse one input line. Blank lines yield `Ok(None)`.
///
/// # Errors
///
/// Returns a usage message if the command is unknown or has the wrong
/// number of arguments.
pub fn parse(line: &str) -> Result<Option<Command>, String> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let Some((&name, args)) = words.split_first() else {
        return Ok(None);
    };

    let command = match (name.to_lowercase().as_str(), args) {
        ("add", [username, password, roles]) => Command::Add {
            username: (*username).to_string(),
            password: (*password).to_string(),
            roles: roles
                .split(',')
                .filter(|r| !r.is_empty())
                .map(str::to_string)
                .collect(),
        },
        ("passwd", [username, password]) => Command::Passwd {
            username: (*username).to_string(),
            password: (*password).to_string(),
        },
        ("del", [username]) => Command::Delete {
            username: (*username).to_string(),
        },
        ("get", [username]) => Command::Get {
            username: (*username).to_string(),
        },
        ("auth", [username, password]) => Command::Auth {
            username: (*username).to_string(),
            password: (*password).to_string(),
        },
        ("list", []) => Command::List,
        ("sweep", []) => Command::Sweep,
        ("help", []) => Command::Help,
        ("quit" | "exit", []) => Command::Quit,
        _ => return Err(USAGE.to_string()),
    };
    Ok(Some(command))
}

/// Answer commands read from `input` until `quit` or end of input.
///
/// Lines that are not valid UTF-8 get a `400` reply and are skipped.
///
/// # Errors
///
/// Returns an error if reading `input` or writing `output` fails.
pub async fn serve<P, R, W>(
    manager: &AccountManager<InMemoryDirectory, P>,
    input: R,
    mut output: W,
) -> std::io::Result<()>
where
    P: PersistenceProvider,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.split(b'\n');
    while let Some(bytes) = lines.next_segment().await? {
        let reply = match std::str::from_utf8(&bytes) {
            Err(_) => "400 input line is not valid UTF-8".to_string(),
            Ok(line) => match parse(line) {
                Ok(None) => continue,
                Ok(Some(Command::Quit)) => break,
                Ok(Some(command)) => execute(manager, command).await,
                Err(usage) => format!("400 {usage}"),
            },
        };
        output.write_all(reply.as_bytes()).await?;
        output.write_all(b"\n").await?;
        output.flush().await?;
    }
    Ok(())
}

/// Format an error reply.
fn failure(error: &Error) -> String {
    format!("{} {error}", error.kind().status_code())
}

/// Run `command` against `manager` and render the reply line.
pub async fn execute<P>(manager: &AccountManager<InMemoryDirectory, P>, command: Command) -> String
where
    P: PersistenceProvider,
{
    match command {
        Command::Add {
            username,
            password,
            roles,
        } => match manager.add_account(&username, &password, roles).await {
            Ok(()) => format!("201 created {username}"),
            Err(e) => failure(&e),
        },
        Command::Passwd { username, password } => {
            match manager.update_password(&username, &password).await {
                Ok(()) => format!("200 password updated for {username}"),
                Err(e) => failure(&e),
            }
        }
        Command::Delete { username } => match manager.delete_account(&username).await {
            Ok(()) => format!("200 deleted {username}"),
            Err(e) => failure(&e),
        },
        Command::Get { username } => match manager.get_account(&username) {
            Ok(account) => {
                let roles: Vec<&str> = account.roles.iter().map(String::as_str).collect();
                format!(
                    "200 {} roles={} expires_at={} history={}{}",
                    account.username,
                    roles.join(","),
                    account.expires_at.to_rfc3339(),
                    account.password_history.len(),
                    if manager.is_flagged(&username) {
                        " expired"
                    } else {
                        ""
                    }
                )
            }
            Err(e) => failure(&e),
        },
        Command::Auth { username, password } => {
            if manager.directory().authenticate(&username, &password) {
                format!("200 authenticated {username}")
            } else {
                "401 authentication failed".to_string()
            }
        }
        Command::List => format!("200 {}", manager.usernames().join(" ")),
        Command::Sweep => {
            let report = manager.sweep_expired().await;
            format!(
                "200 scanned={} flagged={} failed={}",
                report.scanned, report.flagged, report.failed
            )
        }
        Command::Help => format!("200 {USAGE}"),
        Command::Quit => "200 bye".to_string(),
    }
}
