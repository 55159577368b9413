use std::time::Duration;

use http::Method;
use retryable::prelude::{CallContext, Request, RetryableClient};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("retryable=debug")),
        )
        .init();

    let client = RetryableClient::builder()
        .client_name("retryable-demo")
        .max_retries(4)
        .max_interval(Duration::from_secs(2))
        .max_elapsed_time(Duration::from_secs(20))
        .request_timeout(Duration::from_secs(5))
        .try_build()?;

    let request = Request::replayable(
        Method::POST,
        "https://httpbin.org/status/503,200",
        &br#"{"msg":"hello, world!"}"#[..],
    )?
    .try_header("content-type", "application/json")?;

    let context = CallContext::new();
    match client.execute(&context, &request).await {
        Ok(response) => println!("status={}", response.status()),
        Err(error) => println!("error code={} message={error}", error.code()),
    }
    println!(
        "attempts={:?} successful_attempt={:?}",
        context.attempts(),
        context.successful_duration()
    );
    println!("metrics={:?}", client.metrics_snapshot());
    Ok(())
}
