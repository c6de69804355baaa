//! Headless-browser capture of direct media URLs.
//!
//! The solver clears the bot challenge and hands back cookies plus the user
//! agent it used; this module replays that identity in a locally controlled
//! Chromium, navigates to the post page, and watches outbound network
//! requests for the first one that looks like the media asset. Single-shot,
//! first match wins, explicit teardown on match or timeout.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chromiumoxide::cdp::browser_protocol::network::{
    CookieParam, EventRequestWillBeSent, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::config::SiteProfile;
use crate::solver::SolverCookie;

/// Total budget for the navigate-and-capture step.
const CAPTURE_TIMEOUT: Duration = Duration::from_secs(15);

/// Common Chromium executable locations, checked before falling back to PATH.
const CHROME_PATHS: &[&str] = &[
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    "/opt/google/chrome/google-chrome",
];

fn find_chrome() -> Result<std::path::PathBuf> {
    for path in CHROME_PATHS {
        let p = std::path::Path::new(path);
        if p.exists() {
            return Ok(p.to_path_buf());
        }
    }
    for cmd in &["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"] {
        if let Ok(output) = std::process::Command::new("which").arg(cmd).output() {
            if output.status.success() {
                let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path.is_empty() {
                    return Ok(std::path::PathBuf::from(path));
                }
            }
        }
    }
    Err(anyhow!(
        "Chrome/Chromium not found; install chromium or google-chrome"
    ))
}

/// Whether a captured request URL is the media asset for `post_id`.
pub fn is_media_request(url: &str, post_id: &str, site: &SiteProfile) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    if url.contains(post_id) && path.ends_with(site.media_extension.as_str()) {
        return true;
    }
    if let Ok(parsed) = url::Url::parse(url) {
        if let Some(host) = parsed.host_str() {
            return site.cdn_hosts.iter().any(|cdn| host == cdn);
        }
    }
    false
}

/// Navigate to `post_url` with the solver's identity and return the first
/// outbound request URL that matches the media shape, or `None` if nothing
/// matched within the capture timeout.
pub async fn sniff_media_url(
    post_url: &str,
    post_id: &str,
    cookies: &[SolverCookie],
    user_agent: &str,
    site: &SiteProfile,
) -> Result<Option<String>> {
    let chrome = find_chrome()?;
    let config = BrowserConfig::builder()
        .chrome_executable(chrome)
        .arg("--disable-blink-features=AutomationControlled")
        .arg("--disable-dev-shm-usage")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--disable-background-networking")
        .arg("--no-sandbox")
        .arg("--disable-gpu")
        .build()
        .map_err(|e| anyhow!("browser config: {}", e))?;

    let (mut browser, mut handler) = Browser::launch(config)
        .await
        .context("launching capture browser")?;
    let handler_task = tokio::spawn(async move { while handler.next().await.is_some() {} });

    let result = capture(&browser, post_url, post_id, cookies, user_agent, site).await;

    // Teardown on every path, match or not.
    let _ = browser.close().await;
    let _ = browser.wait().await;
    handler_task.abort();

    result
}

async fn capture(
    browser: &Browser,
    post_url: &str,
    post_id: &str,
    cookies: &[SolverCookie],
    user_agent: &str,
    site: &SiteProfile,
) -> Result<Option<String>> {
    let page = browser.new_page("about:blank").await?;

    page.execute(SetUserAgentOverrideParams::new(user_agent.to_string()))
        .await?;

    let params: Vec<CookieParam> = cookies
        .iter()
        .filter_map(|c| {
            let mut builder = CookieParam::builder()
                .name(c.name.clone())
                .value(c.value.clone())
                .path(if c.path.is_empty() { "/".to_string() } else { c.path.clone() });
            // CDP needs a scope for the cookie: the solver's domain when it
            // reported one, the post URL otherwise.
            if c.domain.is_empty() {
                builder = builder.url(post_url);
            } else {
                builder = builder.domain(c.domain.clone());
            }
            builder.build().ok()
        })
        .collect();
    if !params.is_empty() {
        page.set_cookies(params).await?;
    }

    let mut requests = page.event_listener::<EventRequestWillBeSent>().await?;

    // Navigation runs concurrently with the capture loop; media requests
    // usually fire while the page is still loading.
    let nav_params = NavigateParams::builder()
        .url(post_url)
        .build()
        .map_err(|e| anyhow!("invalid post URL: {}", e))?;
    let nav_page = page.clone();
    let nav = tokio::spawn(async move {
        if let Err(e) = nav_page.execute(nav_params).await {
            debug!(error = %e, "capture navigation ended early");
        }
    });

    let deadline = tokio::time::sleep(CAPTURE_TIMEOUT);
    tokio::pin!(deadline);

    let captured = loop {
        tokio::select! {
            event = requests.next() => {
                match event {
                    Some(event) => {
                        let request_url = event.request.url.clone();
                        if is_media_request(&request_url, post_id, site) {
                            info!(url = %request_url, "captured media request");
                            break Some(request_url);
                        }
                    }
                    None => break None,
                }
            }
            _ = &mut deadline => {
                warn!(%post_url, "media capture timed out");
                break None;
            }
        }
    };

    nav.abort();
    let _ = page.close().await;
    Ok(captured)
}

/// Follow redirects on a captured URL via HEAD to surface the final CDN
/// location. Falls back to the captured URL if the HEAD fails.
pub async fn follow_redirects(url: &str, user_agent: &str) -> String {
    let client = match reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::limited(10))
        .timeout(Duration::from_secs(30))
        .build()
    {
        Ok(c) => c,
        Err(_) => return url.to_string(),
    };

    match client
        .head(url)
        .header(reqwest::header::USER_AGENT, user_agent)
        .send()
        .await
    {
        Ok(resp) => resp.url().to_string(),
        Err(e) => {
            debug!(error = %e, "redirect follow failed, keeping captured URL");
            url.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> SiteProfile {
        SiteProfile {
            post_path_marker: "/post/".to_string(),
            media_extension: ".vid".to_string(),
            cdn_hosts: vec!["cdn.example.net".to_string()],
            page_size: 30,
            monitor_page_cap: 10,
        }
    }

    #[test]
    fn test_matches_id_and_extension() {
        assert!(is_media_request(
            "https://media.example/stream/X1.vid?tok=a",
            "X1",
            &site()
        ));
    }

    #[test]
    fn test_rejects_wrong_extension() {
        assert!(!is_media_request(
            "https://media.example/stream/X1.jpg",
            "X1",
            &site()
        ));
    }

    #[test]
    fn test_rejects_other_post_id() {
        assert!(!is_media_request(
            "https://media.example/stream/X2.vid",
            "X1",
            &site()
        ));
    }

    #[test]
    fn test_matches_known_cdn_host() {
        // CDN-hosted requests match regardless of extension or id.
        assert!(is_media_request(
            "https://cdn.example.net/blob/9f3a",
            "X1",
            &site()
        ));
    }
}
