//! HTML callback pipeline (§4.6): selector registration order, `HtmlElement`
//! accessors, malformed-selector rejection.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use monkey_king::CollectorConfig;

#[tokio::test]
async fn callbacks_fire_in_registration_order() {
    let mut server = mockito::Server::new_async().await;
    let body = r#"<html><body><p class="a">one</p><p class="b">two</p></body></html>"#;
    server.mock("GET", "/page").with_status(200).with_body(body).create_async().await;

    let config = CollectorConfig::builder().with_task_interval(Duration::from_millis(0)).build();
    let collector = monkey_king::Collector::new(config).unwrap();

    let order = Arc::new(Mutex::new(Vec::new()));

    let order_a = Arc::clone(&order);
    collector
        .on_html("p.a", move |_task, _element| {
            order_a.lock().unwrap().push("a");
            Ok(())
        })
        .unwrap();

    let order_b = Arc::clone(&order);
    collector
        .on_html("p.b", move |_task, _element| {
            order_b.lock().unwrap().push("b");
            Ok(())
        })
        .unwrap();

    collector.visit(&format!("{}/page", server.url())).await.unwrap();

    let runner = collector.clone();
    let handle = tokio::spawn(async move { runner.run().await });
    tokio::time::sleep(Duration::from_millis(300)).await;
    collector.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;

    assert_eq!(&*order.lock().unwrap(), &["a", "b"]);
}

#[tokio::test]
async fn html_element_exposes_attrs_and_text() {
    let mut server = mockito::Server::new_async().await;
    let body = r#"<html><body><h1>Headline</h1><a href="/x" data-id="7">link text</a></body></html>"#;
    server.mock("GET", "/article").with_status(200).with_body(body).create_async().await;

    let config = CollectorConfig::builder().with_task_interval(Duration::from_millis(0)).build();
    let collector = monkey_king::Collector::new(config).unwrap();

    let captured = Arc::new(Mutex::new(None));
    let captured_write = Arc::clone(&captured);
    collector
        .on_html("a", move |_task, element| {
            let headline = element.get_text("h1", "missing");
            *captured_write.lock().unwrap() = Some((
                element.attr("href").map(str::to_string),
                element.attr("data-id").map(str::to_string),
                element.text.clone(),
                headline,
            ));
            Ok(())
        })
        .unwrap();

    collector.visit(&format!("{}/article", server.url())).await.unwrap();

    let runner = collector.clone();
    let handle = tokio::spawn(async move { runner.run().await });
    tokio::time::sleep(Duration::from_millis(300)).await;
    collector.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;

    let (href, data_id, text, headline) = captured.lock().unwrap().clone().expect("callback never ran");
    assert_eq!(href.as_deref(), Some("/x"));
    assert_eq!(data_id.as_deref(), Some("7"));
    assert_eq!(text, "link text");
    assert_eq!(headline, "Headline");
}

#[test]
fn malformed_selector_is_rejected_at_registration() {
    let config = CollectorConfig::default();
    let collector = monkey_king::Collector::new(config).unwrap();
    let err = collector.on_html("[", |_task, _el| Ok(())).unwrap_err();
    assert!(matches!(err, monkey_king::EngineError::InvalidSelector(_)));
}
