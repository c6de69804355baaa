//! Run command: the automated ingestion loop.

use std::sync::Arc;

use anyhow::Result;
use console::style;

use super::Runtime;
use crate::automation::AutomationLoop;
use crate::config::Settings;

pub async fn cmd_run(settings: &Settings) -> Result<()> {
    let runtime = Runtime::build(settings)?;
    runtime.install_signal_handler();
    runtime.pipeline.start().await;

    println!(
        "{} Automation started ({} download / {} upload workers). Ctrl-C to stop.",
        style("→").cyan(),
        settings.download_workers,
        if settings.delivery.is_some() {
            settings.upload_workers
        } else {
            0
        },
    );

    let automation = AutomationLoop::new(
        runtime.channels.clone(),
        runtime.videos.clone(),
        Arc::new(runtime.scanner),
        runtime.fetcher.clone(),
        Arc::clone(&runtime.pipeline),
        runtime.cancel.clone(),
        settings.cycle_delay,
    );
    automation.run().await?;

    // Cancellation reached the loop; drain workers and release the session.
    runtime.pipeline.stop().await;
    runtime.sessions.shutdown().await;

    println!("{} Shut down cleanly", style("✓").green());
    Ok(())
}
