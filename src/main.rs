use std::env;

use chrono::Local;
use jobscrap::captcha::{spawn_stdin_operator, CaptchaGate};
use jobscrap::process::process_queue;
use jobscrap::queue::load_queue;
use jobscrap::request::{ChromeBrowser, HttpBrowser};
use jobscrap::{
    config_env_var, default_queue_path, info_time, warn_time, BrowserKind, JsonlRepository,
    Result, ScraperConfig,
};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    let start_time = Local::now();

    let config = match env::var(config_env_var()) {
        Ok(path) => ScraperConfig::load(path).await?,
        Err(_) => ScraperConfig::default(),
    };
    let queue_path = env::args()
        .nth(1)
        .unwrap_or_else(|| default_queue_path().to_string());
    let specs = load_queue(&queue_path).await?;

    let repo = JsonlRepository::open(&config.store_path).await?;
    let (mut gate, resume) = CaptchaGate::from_config(&config);
    spawn_stdin_operator(resume, gate.subscribe());

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn_time!("Interrupted, wrapping up the current search");
                cancel.cancel();
            }
        }
    });

    match config.browser {
        BrowserKind::Chrome => {
            let mut browser = ChromeBrowser::launch(&config).await?;
            let processed =
                process_queue(specs, &mut browser, &mut gate, &repo, &config, &cancel).await;
            browser.close().await?;
            processed?;
        }
        BrowserKind::Http => {
            let mut browser = HttpBrowser::new(&config)?;
            process_queue(specs, &mut browser, &mut gate, &repo, &config, &cancel).await?;
        }
    }
    info_time!(start_time, "Full program time:");

    // A pending stdin read would hold up runtime shutdown.
    if cancel.is_cancelled() {
        std::process::exit(130);
    }
    Ok(())
}
