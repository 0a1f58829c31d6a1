//! End-to-end Collector scenarios (§8): seed+follow-link, depth cap, download-to-disk.

use std::time::Duration;

use monkey_king::{Collector, CollectorConfig, TaskState};

async fn wait_for<F: Fn() -> bool>(condition: F, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

async fn wait_for_rows(collector: &Collector, timeout: Duration, mut want: impl FnMut(&[monkey_king::Row]) -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let rows = collector.get_rows().await;
        if want(&rows) {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn seed_page_follows_a_single_link() {
    let mut server = mockito::Server::new_async().await;
    let seed_body = format!(r#"<html><body><a href="/next">go</a></body></html>"#);
    server.mock("GET", "/seed").with_status(200).with_body(seed_body).create_async().await;
    server.mock("GET", "/next").with_status(200).with_body("<html></html>").create_async().await;

    let config = CollectorConfig::builder()
        .with_task_interval(Duration::from_millis(0))
        .build();
    let collector = monkey_king::Collector::new(config).unwrap();

    collector
        .on_html("a", |_task, element| {
            let href = element.attr("href").unwrap_or_default().to_string();
            let request = element.request.clone();
            tokio::spawn(async move {
                let _ = request.visit(&href).await;
            });
            Ok(())
        })
        .unwrap();

    collector.visit(&format!("{}/seed", server.url())).await.unwrap();

    let runner = collector.clone();
    let handle = tokio::spawn(async move { runner.run().await });

    let found = wait_for_rows(&collector, Duration::from_secs(3), |rows| {
        rows.len() == 2 && rows.iter().all(|r| r.state == TaskState::Successful || r.state == TaskState::SuccessfulAll)
    })
    .await;

    collector.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;

    assert!(found, "expected both seed and followed page to complete");
}

#[tokio::test]
async fn revisiting_the_same_url_is_deduped() {
    let mut server = mockito::Server::new_async().await;
    let seed_body =
        r#"<html><body><a href="/dup">a</a><a href="/dup">b</a></body></html>"#.to_string();
    let mock = server.mock("GET", "/dup").with_status(200).with_body("<html></html>").expect(1).create_async().await;
    server.mock("GET", "/seed2").with_status(200).with_body(seed_body).create_async().await;

    let config = CollectorConfig::builder().with_task_interval(Duration::from_millis(0)).build();
    let collector = monkey_king::Collector::new(config).unwrap();

    collector
        .on_html("a", |_task, element| {
            let href = element.attr("href").unwrap_or_default().to_string();
            let request = element.request.clone();
            tokio::spawn(async move {
                let _ = request.visit(&href).await;
            });
            Ok(())
        })
        .unwrap();

    collector.visit(&format!("{}/seed2", server.url())).await.unwrap();

    let runner = collector.clone();
    let handle = tokio::spawn(async move { runner.run().await });

    tokio::time::sleep(Duration::from_millis(500)).await;
    collector.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;

    mock.assert_async().await;
}

#[tokio::test]
async fn download_request_writes_file_to_disk() {
    let mut server = mockito::Server::new_async().await;
    let seed_body = r#"<html><body><img src="/pic.jpg"></body></html>"#.to_string();
    server.mock("GET", "/gallery").with_status(200).with_body(seed_body).create_async().await;
    server.mock("GET", "/pic.jpg").with_status(200).with_body("binary-image-bytes").create_async().await;

    let dir = tempfile::tempdir().unwrap();
    let dir_path = dir.path().to_str().unwrap().to_string();

    let config = CollectorConfig::builder().with_task_interval(Duration::from_millis(0)).build();
    let collector = monkey_king::Collector::new(config).unwrap();

    let dir_for_callback = dir_path.clone();
    collector
        .on_html("img", move |_task, element| {
            let src = element.attr("src").unwrap_or_default().to_string();
            let request = element.request.clone();
            let dir = dir_for_callback.clone();
            tokio::spawn(async move {
                let _ = request.download("pic.jpg", &dir, &src).await;
            });
            Ok(())
        })
        .unwrap();

    collector.visit(&format!("{}/gallery", server.url())).await.unwrap();

    let runner = collector.clone();
    let handle = tokio::spawn(async move { runner.run().await });

    let path = dir.path().join("pic.jpg");
    let written = wait_for(|| path.exists(), Duration::from_secs(3)).await;

    collector.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;

    assert!(written, "expected downloaded file to appear on disk");
    assert_eq!(tokio::fs::read(&path).await.unwrap(), b"binary-image-bytes");
}
