//! `weft set-max-parallel <n>`: posts a `config_update` event to a
//! running session over its HTTP control surface (§4.4, Scenario E).

use anyhow::{Context, Result};
use serde_json::json;

pub async fn run(control_bind_addr: &str, max_parallel: u32) -> Result<()> {
    anyhow::ensure!(max_parallel > 0, "max_parallel must be at least 1");

    let client = reqwest::Client::new();
    let url = format!("http://{control_bind_addr}/config");
    let response = client
        .post(&url)
        .json(&json!({ "max_parallel": max_parallel }))
        .send()
        .await
        .with_context(|| format!("failed to reach control surface at {url}; is `weft start` running?"))?;

    anyhow::ensure!(response.status().is_success(), "control surface rejected config update: {}", response.status());
    println!("max_parallel set to {max_parallel}.");
    Ok(())
}
