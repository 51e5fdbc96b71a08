use std::path::Path;

use anyhow::{Context, Result};
use cliclack::spinner;
use console::style;

use alfred::bootstrap::load_guests;
use alfred::config::Settings;
use alfred::guests::{GuestStore, DATASETS_SERVER_URL};

pub async fn download(dataset: &str, output: &Path) -> Result<()> {
    let spin = spinner();
    spin.start(format!("Fetching {} from the Hugging Face Hub", dataset));

    let client = reqwest::Client::new();
    let store = match GuestStore::download(&client, DATASETS_SERVER_URL, dataset).await {
        Ok(store) => store,
        Err(e) => {
            spin.error(format!("Download failed: {}", e));
            return Err(e);
        }
    };
    store
        .save(output)
        .with_context(|| format!("failed to write {}", output.display()))?;

    spin.stop(format!(
        "Saved {} guests to {}",
        store.len(),
        output.display()
    ));
    println!(
        "Point Alfred at it with {}",
        style(format!("ALFRED_GUESTS__PATH={}", output.display())).green()
    );
    Ok(())
}

pub fn list(settings: &Settings) -> Result<()> {
    let store = load_guests(settings)?;
    for guest in store.guests() {
        println!("{}", style(&guest.name).bold());
        println!("  {}", style(&guest.relation).dim());
        println!("  {}", guest.email);
    }
    println!("\n{} guests", store.len());
    Ok(())
}
