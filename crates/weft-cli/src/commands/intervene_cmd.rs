//! `weft intervene <text>`: posts a new requirement to a running session's
//! Control Bus over its HTTP control surface (§4.9, §6). This command
//! does nothing itself beyond the POST -- the running `weft start`
//! process owns the scheduler and decides what to do with it.

use anyhow::{Context, Result};
use serde_json::json;

pub async fn run(control_bind_addr: &str, text: &str) -> Result<()> {
    let client = reqwest::Client::new();
    let url = format!("http://{control_bind_addr}/intervene");
    let response = client
        .post(&url)
        .json(&json!({ "text": text }))
        .send()
        .await
        .with_context(|| format!("failed to reach control surface at {url}; is `weft start` running?"))?;

    anyhow::ensure!(response.status().is_success(), "control surface rejected intervention: {}", response.status());
    println!("Intervention delivered.");
    Ok(())
}
