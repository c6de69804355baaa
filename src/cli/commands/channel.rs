//! Channel management commands.

use anyhow::Result;
use console::style;

use crate::config::Settings;
use crate::repository::ChannelRepository;

pub fn cmd_add(settings: &Settings, name: &str, url: &str, interval: Option<i64>) -> Result<()> {
    settings.ensure_dirs()?;
    let channels = ChannelRepository::new(&settings.database_path)?;
    let interval = interval.unwrap_or(settings.default_interval_minutes);
    channels.save(name, url, interval)?;
    println!(
        "{} Channel '{}' saved (every {} minutes)",
        style("✓").green(),
        name,
        interval
    );
    Ok(())
}

pub fn cmd_list(settings: &Settings) -> Result<()> {
    if !settings.database_exists() {
        println!(
            "{} Store not initialized. Run 'vidacquire init' first.",
            style("!").yellow()
        );
        return Ok(());
    }
    let channels = ChannelRepository::new(&settings.database_path)?;
    let all = channels.get_all()?;
    if all.is_empty() {
        println!("{} No channels configured", style("·").dim());
        return Ok(());
    }
    for channel in all {
        println!(
            "{:>4}  {:<24} every {:>4}m  {}",
            channel.id, channel.name, channel.check_interval_minutes, channel.url
        );
    }
    Ok(())
}
