use recipe_scout::{BrowserPool, FetchBudgets, StealthFetcher};
use tracing::{error, info};

fn parse_url_from_args() -> Option<String> {
    std::env::args().skip(1).find(|a| !a.starts_with("--"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing; logs go to stderr so stdout carries only the markup.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let Some(url) = parse_url_from_args() else {
        eprintln!("usage: recipe-scout <url>");
        std::process::exit(2);
    };

    let Some(pool) = BrowserPool::new_auto() else {
        error!(
            "No browser found. Install Chrome, Chromium, or Brave. \
             Set CHROME_EXECUTABLE if installed in a non-standard location."
        );
        std::process::exit(1);
    };

    let fetcher = StealthFetcher::new(pool.clone()).with_budgets(FetchBudgets::from_config_file());

    info!("Fetching rendered page: {}", url);
    let html = fetcher.fetch_rendered(&url).await;
    pool.shutdown().await;

    if html.is_empty() {
        error!("Browser fetch returned nothing; retry via a plain HTTP client");
        std::process::exit(1);
    }

    println!("{}", html);
    Ok(())
}
