//! Status command: store counts and channel overview.

use anyhow::Result;
use chrono::Local;
use console::style;

use crate::config::Settings;
use crate::repository::{ChannelRepository, VideoRepository};

pub async fn cmd_status(settings: &Settings) -> Result<()> {
    if !settings.database_exists() {
        println!(
            "{} Store not initialized. Run 'vidacquire init' first.",
            style("!").yellow()
        );
        return Ok(());
    }

    let channels = ChannelRepository::new(&settings.database_path)?;
    let videos = VideoRepository::new(&settings.database_path)?;

    let separator = "─".repeat(60);
    println!();
    println!(
        "{:<40} {}",
        style("vidacquire status").bold(),
        Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    println!("{}", separator);
    println!("Store:        {}", settings.database_path.display());
    println!("Download dir: {}", settings.download_dir.display());
    println!();

    println!("{}", style("VIDEOS").cyan().bold());
    println!("  {:<22} {:>8}", "Pending download:", videos.count_undownloaded()?);
    println!("  {:<22} {:>8}", "Downloaded:", videos.count_downloads()?);
    println!("  {:<22} {:>8}", "Pending upload:", videos.count_pending_uploads()?);
    println!("  {:<22} {:>8}", "Uploaded:", videos.count_uploads()?);
    println!();

    let all_channels = channels.get_all()?;
    if !all_channels.is_empty() {
        println!(
            "{:<24} {:>10} {:>8} {:>20}",
            style("CHANNELS").cyan().bold(),
            "Interval",
            "Active",
            "Last checked"
        );
        for channel in all_channels {
            let last = channel
                .last_checked
                .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "never".to_string());
            println!(
                "  {:<22} {:>8}m {:>8} {:>20}",
                channel.name,
                channel.check_interval_minutes,
                if channel.is_active { "yes" } else { "no" },
                last
            );
        }
    }
    println!("{}", separator);

    Ok(())
}
