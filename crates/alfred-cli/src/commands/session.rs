use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Result};
use cliclack::confirm;
use rand::{distributions::Alphanumeric, Rng};

use alfred::bootstrap::build_agent;
use alfred::config::Settings;
use alfred::session::Session as History;

use crate::prompt::rustyline::RustylinePrompt;
use crate::session::session_file::{
    deserialize_messages, ensure_session_dir, most_recent_session, readable_session_file,
    session_path,
};
use crate::session::Session;

pub async fn build_session<'a>(
    settings: &Settings,
    name: Option<String>,
    resume: bool,
) -> Result<Session<'a>> {
    let session_dir = ensure_session_dir()?;
    let (session_file, load_existing) = resolve_session_file(&session_dir, name, resume)?;

    let messages = if load_existing {
        deserialize_messages(readable_session_file(&session_file)?)?
    } else {
        Vec::new()
    };
    let id = session_file
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("session")
        .to_string();
    let history = History::with_id(id).with_messages(messages);
    tracing::debug!(
        session_file = %session_file.display(),
        resumed = load_existing,
        messages = history.len(),
        "session transcript ready"
    );

    let agent = build_agent(settings).await?;
    let prompt = RustylinePrompt::new();
    Ok(Session::new(agent, Box::new(prompt), session_file, history))
}

/// The transcript file to use and whether its messages should be loaded
fn resolve_session_file(
    session_dir: &Path,
    name: Option<String>,
    resume: bool,
) -> Result<(PathBuf, bool)> {
    match (name, resume) {
        (Some(name), true) => {
            let session_file = session_path(session_dir, &name);
            if !session_file.exists() {
                bail!(
                    "Cannot resume session '{}': no transcript in {}",
                    name,
                    session_dir.display()
                );
            }
            Ok((session_file, true))
        }
        (None, true) => {
            let session_file = most_recent_session(session_dir)?
                .ok_or_else(|| anyhow!("No sessions to resume in {}", session_dir.display()))?;
            Ok((session_file, true))
        }
        (Some(name), false) => {
            let session_file = session_path(session_dir, &name);
            if !session_file.exists() {
                return Ok((session_file, false));
            }
            if !console::user_attended() {
                return Ok((session_file, true));
            }
            let resume = confirm(format!(
                "Session '{}' already exists. Continue it? (no starts over)",
                name
            ))
            .initial_value(true)
            .interact()?;
            Ok((session_file, resume))
        }
        (None, false) => loop {
            let session_file = session_path(session_dir, &generate_session_name());
            if !session_file.exists() {
                break Ok((session_file, false));
            }
        },
    }
}

fn generate_session_name() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect::<String>()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_generated_names_are_short_and_lowercase() {
        let name = generate_session_name();
        assert_eq!(name.len(), 8);
        assert!(name
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[test]
    fn test_resume_missing_session_fails() {
        let dir = tempdir().unwrap();
        let err = resolve_session_file(dir.path(), Some("gala".to_string()), true).unwrap_err();
        assert!(err.to_string().contains("Cannot resume session 'gala'"));
    }

    #[test]
    fn test_resume_named_session_loads_it() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("gala.jsonl"), "").unwrap();

        let (file, load) =
            resolve_session_file(dir.path(), Some("gala".to_string()), true).unwrap();
        assert_eq!(file, dir.path().join("gala.jsonl"));
        assert!(load);
    }

    #[test]
    fn test_new_named_session_starts_empty() {
        let dir = tempdir().unwrap();
        let (file, load) =
            resolve_session_file(dir.path(), Some("fresh".to_string()), false).unwrap();
        assert_eq!(file, dir.path().join("fresh.jsonl"));
        assert!(!load);
    }

    #[test]
    fn test_resume_without_sessions_fails() {
        let dir = tempdir().unwrap();
        assert!(resolve_session_file(dir.path(), None, true).is_err());
    }

    #[test]
    fn test_random_session_lands_in_dir() {
        let dir = tempdir().unwrap();
        let (file, load) = resolve_session_file(dir.path(), None, false).unwrap();
        assert_eq!(file.parent(), Some(dir.path()));
        assert_eq!(file.extension().and_then(|e| e.to_str()), Some("jsonl"));
        assert!(!load);
    }
}
