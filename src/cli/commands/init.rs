//! Init command: create directories, initialize the store, probe the solver.

use anyhow::{bail, Context, Result};
use console::style;

use crate::config::Settings;
use crate::logging::EventLog;
use crate::repository::{ChannelRepository, VideoRepository};
use crate::solver::SolverClient;

pub async fn cmd_init(settings: &Settings) -> Result<()> {
    settings.ensure_dirs()?;

    ChannelRepository::new(&settings.database_path).context("initializing channel schema")?;
    VideoRepository::new(&settings.database_path).context("initializing video schema")?;
    EventLog::new(&settings.download_dir)?;

    println!(
        "{} Store initialized at {}",
        style("✓").green(),
        settings.database_path.display()
    );
    println!(
        "{} Download directory: {}",
        style("✓").green(),
        settings.download_dir.display()
    );

    let solver = SolverClient::new(&settings.solver_url)?;
    if solver.test_connection().await {
        println!(
            "{} Solver reachable at {}",
            style("✓").green(),
            settings.solver_url
        );
    } else {
        bail!("solver unreachable at {}", settings.solver_url);
    }

    match &settings.delivery {
        Some(delivery) => println!(
            "{} Delivery enabled (chat {})",
            style("✓").green(),
            delivery.chat_id
        ),
        None => println!("{} Delivery disabled (no token/chat/base URL)", style("·").dim()),
    }

    Ok(())
}
