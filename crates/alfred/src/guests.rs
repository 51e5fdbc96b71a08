use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const BUNDLED_GUESTS: &str = include_str!("../data/invitees.json");

pub const DEFAULT_DATASET: &str = "agents-course/unit3-invitees";
pub const DATASETS_SERVER_URL: &str = "https://datasets-server.huggingface.co";
const ROWS_PAGE_SIZE: usize = 100;

/// One invitee. Records are loaded once and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guest {
    pub name: String,
    pub relation: String,
    pub description: String,
    pub email: String,
}

impl Guest {
    /// The text indexed by the retriever and returned by the guest lookup tool
    pub fn snippet(&self) -> String {
        format!(
            "Name: {}\nRelation: {}\nDescription: {}\nEmail: {}",
            self.name, self.relation, self.description, self.email
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct GuestStore {
    guests: Vec<Guest>,
}

impl GuestStore {
    pub fn new(guests: Vec<Guest>) -> Self {
        Self { guests }
    }

    /// The guest list compiled into the binary
    pub fn bundled() -> Result<Self> {
        Self::parse(BUNDLED_GUESTS).context("bundled guest list is malformed")
    }

    /// Load a guest list from a JSON array or a JSON-lines file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read guest list {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("failed to parse guest list {}", path.display()))
    }

    fn parse(raw: &str) -> Result<Self> {
        let guests = if raw.trim_start().starts_with('[') {
            serde_json::from_str(raw)?
        } else {
            raw.lines()
                .filter(|line| !line.trim().is_empty())
                .map(serde_json::from_str)
                .collect::<Result<Vec<Guest>, _>>()?
        };
        Ok(Self::new(guests))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(&self.guests)?)?;
        Ok(())
    }

    pub fn guests(&self) -> &[Guest] {
        &self.guests
    }

    pub fn get(&self, index: usize) -> Option<&Guest> {
        self.guests.get(index)
    }

    pub fn len(&self) -> usize {
        self.guests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guests.is_empty()
    }

    /// Download the train split of a Hugging Face dataset through the datasets-server rows API
    pub async fn download(client: &Client, base_url: &str, dataset: &str) -> Result<Self> {
        let url = format!("{}/rows", base_url.trim_end_matches('/'));
        let mut guests = Vec::new();
        let mut offset = 0;

        loop {
            let offset_param = offset.to_string();
            let length_param = ROWS_PAGE_SIZE.to_string();
            let page: Value = client
                .get(&url)
                .query(&[
                    ("dataset", dataset),
                    ("config", "default"),
                    ("split", "train"),
                    ("offset", offset_param.as_str()),
                    ("length", length_param.as_str()),
                ])
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;

            let rows = page
                .get("rows")
                .and_then(Value::as_array)
                .ok_or_else(|| anyhow!("datasets-server response had no rows"))?;
            for row in rows {
                let guest: Guest = serde_json::from_value(row["row"].clone())
                    .with_context(|| format!("unexpected row shape: {}", row))?;
                guests.push(guest);
            }

            offset += rows.len();
            let total = page
                .get("num_rows_total")
                .and_then(Value::as_u64)
                .unwrap_or(offset as u64) as usize;
            if rows.is_empty() || offset >= total {
                break;
            }
        }

        tracing::info!(dataset, count = guests.len(), "downloaded guest list");
        Ok(Self::new(guests))
    }
}
