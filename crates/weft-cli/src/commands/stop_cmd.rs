//! `weft stop`: posts a `stop` event to a running session over its HTTP
//! control surface -- the ESC-interrupt path exposed outside the TUI
//! (§4.5).

use anyhow::{Context, Result};

pub async fn run(control_bind_addr: &str) -> Result<()> {
    let client = reqwest::Client::new();
    let url = format!("http://{control_bind_addr}/stop");
    let response = client
        .post(&url)
        .send()
        .await
        .with_context(|| format!("failed to reach control surface at {url}; is `weft start` running?"))?;

    anyhow::ensure!(response.status().is_success(), "control surface rejected stop: {}", response.status());
    println!("Stop requested.");
    Ok(())
}
