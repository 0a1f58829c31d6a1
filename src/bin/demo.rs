use anyhow::Result;
use monkey_king::{CollectorConfig, Collector};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    monkey_king::init_logging()?;

    info!("monkey_king crawl engine demo");

    let config = CollectorConfig::builder()
        .with_parallelism_per_domain(2)
        .with_max_depth(2)
        .build();

    let collector = Collector::new(config)?;

    collector.on_html("a", |_task, element| {
        if let Some(href) = element.attr("href") {
            let href = href.to_string();
            let request = element.request.clone();
            tokio::spawn(async move {
                if let Err(e) = request.visit(&href).await {
                    tracing::warn!(error = %e, "demo: follow-link enqueue failed");
                }
            });
        }
        Ok(())
    })?;

    collector.visit("https://example.com").await?;

    let runner = collector.clone();
    let run_handle = tokio::spawn(async move { runner.run().await });

    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
    collector.cancel();
    let _ = run_handle.await;

    for row in collector.get_rows().await {
        info!(id = %row.id, state = %row.state, url = %row.url, age = %row.age, "row");
    }

    Ok(())
}
