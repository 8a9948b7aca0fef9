//! One-shot connector check: fetch a single account (or parse a saved feed) and
//! print what the producer would see, with derived ids.
//!
//! ```text
//! feed_probe <account> [instance]
//! feed_probe --file saved.xml <account>
//! ```

use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokenlaunch_radar::config::DEFAULT_NITTER_INSTANCE;
use tokenlaunch_radar::ingest::providers::nitter::NitterConnector;
use tokenlaunch_radar::ingest::truncate;
use tokenlaunch_radar::ingest::types::SourceConnector;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (connector, account) = match args.as_slice() {
        [flag, path, account] if flag == "--file" => {
            let xml = std::fs::read_to_string(path)
                .with_context(|| format!("reading feed from {path}"))?;
            (NitterConnector::from_fixture(&xml), account.clone())
        }
        [account] => (
            NitterConnector::new(DEFAULT_NITTER_INSTANCE, Duration::from_secs(15))?,
            account.clone(),
        ),
        [account, instance] => (
            NitterConnector::new(instance.clone(), Duration::from_secs(15))?,
            account.clone(),
        ),
        _ => bail!("usage: feed_probe <account> [instance] | feed_probe --file <xml> <account>"),
    };

    let messages = connector.fetch(&account).await?;
    for m in &messages {
        println!(
            "{}  {}  @{}  {}",
            m.id,
            m.created_at.format("%Y-%m-%d %H:%M"),
            m.username,
            truncate(&m.content, 80)
        );
    }
    println!("{} messages from @{account}", messages.len());
    Ok(())
}
