use std::fs::{self, File};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::Result;

use alfred::models::message::Message;

const SESSION_EXTENSION: &str = "jsonl";

/// `~/.config/alfred/sessions`, created on first use
pub fn ensure_session_dir() -> Result<PathBuf> {
    let home_dir =
        dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?;
    let config_dir = home_dir.join(".config").join("alfred").join("sessions");

    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

pub fn session_path(session_dir: &Path, name: &str) -> PathBuf {
    session_dir.join(format!("{}.{}", name, SESSION_EXTENSION))
}

/// The transcript that was written to last
pub fn most_recent_session(session_dir: &Path) -> Result<Option<PathBuf>> {
    let mut latest: Option<(std::time::SystemTime, PathBuf)> = None;

    for entry in fs::read_dir(session_dir)? {
        let path = entry?.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some(SESSION_EXTENSION) {
            continue;
        }
        let modified = fs::metadata(&path)?.modified()?;
        if latest.as_ref().map_or(true, |(time, _)| modified > *time) {
            latest = Some((modified, path));
        }
    }

    Ok(latest.map(|(_, path)| path))
}

pub fn readable_session_file(session_file: &Path) -> Result<File> {
    match fs::OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(session_file)
    {
        Ok(file) => Ok(file),
        Err(e) => Err(anyhow::anyhow!("Failed to open session file: {}", e)),
    }
}

/// Rewrite the whole transcript, one message per line
pub fn persist_messages(session_file: &Path, messages: &[Message]) -> Result<()> {
    let file = File::create(session_file)?;
    persist_messages_internal(file, messages)
}

fn persist_messages_internal(session_file: File, messages: &[Message]) -> Result<()> {
    let mut writer = io::BufWriter::new(session_file);

    for message in messages {
        serde_json::to_writer(&mut writer, &message)?;
        writeln!(writer)?;
    }

    writer.flush()?;
    Ok(())
}

pub fn deserialize_messages(file: File) -> Result<Vec<Message>> {
    let reader = io::BufReader::new(file);
    let mut messages = Vec::new();

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        messages.push(serde_json::from_str::<Message>(&line)?);
    }

    Ok(messages)
}
