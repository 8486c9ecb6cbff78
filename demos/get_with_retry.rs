use std::time::Duration;

use http_dispatch::{get, Context, LogLevel, RequestOptions};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "https://httpbin.org/get".to_owned());

    let options = RequestOptions::from_env()
        .map_err(anyhow::Error::msg)?
        .header("Accept", "application/json")
        .query("source", "http-dispatch")
        .with_retries(2, Duration::from_millis(250))
        .with_timeout(Duration::from_secs(5))
        .with_logging(LogLevel::Basic);

    let ctx = Context::new().with_timeout(Duration::from_secs(30));
    let response = get(&ctx, &url, options).await?;

    println!("{}", response.status());
    println!("{}", response.text().await?);

    Ok(())
}
