use anyhow::Result;

use alfred::config::Settings;

/// Run is a single headless turn recorded like any other session
pub async fn execute(settings: &Settings, text: String, name: Option<String>) -> Result<()> {
    let mut session = super::session::build_session(settings, name, false).await?;
    session.headless_start(text).await
}
