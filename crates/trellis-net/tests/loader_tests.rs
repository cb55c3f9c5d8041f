//! HTTP loader tests against a mock server.

use std::time::Duration;

use trellis_net::{Loader, LoaderSettings, NetError, Request, ResourceLoader};
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn enabled_loader() -> ResourceLoader {
    ResourceLoader::new(LoaderSettings::default().with_resource_loading(true)).unwrap()
}

#[tokio::test]
async fn downloads_style_sheet() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/site.css"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/css")
                .set_body_string("body { margin: 0 }"),
        )
        .mount(&server)
        .await;

    let loader = enabled_loader();
    let url = Url::parse(&format!("{}/site.css", server.uri())).unwrap();
    let download = loader.download(Request::get(url));
    let handle = download.handle();

    let response = download.result().await.unwrap();
    assert!(handle.is_completed());
    assert!(response.ok());
    assert_eq!(response.text(), "body { margin: 0 }");
    assert_eq!(
        response.content_type.as_ref().map(|m| m.essence_str().to_string()),
        Some("text/css".to_string())
    );
}

#[tokio::test]
async fn reports_http_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing.css"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let url = Url::parse(&format!("{}/missing.css", server.uri())).unwrap();
    let response = enabled_loader().fetch(Request::get(url)).await.unwrap();
    assert!(!response.ok());
    assert_eq!(response.status.as_u16(), 404);
}

#[tokio::test]
async fn cancel_stops_slow_download() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/movie.mp4"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
        .mount(&server)
        .await;

    let url = Url::parse(&format!("{}/movie.mp4", server.uri())).unwrap();
    let download = enabled_loader().download(Request::get(url));
    let handle = download.handle();
    assert!(handle.cancel());

    let result = tokio::time::timeout(Duration::from_secs(5), download.result())
        .await
        .unwrap();
    assert!(matches!(result, Err(NetError::Cancelled)));
}

#[tokio::test]
async fn filter_blocks_before_network() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let loader = enabled_loader().with_filter(|request| request.url.path().ends_with(".png"));

    let url = Url::parse(&format!("{}/a.css", server.uri())).unwrap();
    let result = loader.download(Request::get(url.clone())).result().await;
    assert!(matches!(result, Err(NetError::Blocked)));
    let result = loader.navigate(Request::get(url)).await;
    assert!(matches!(result, Err(NetError::Blocked)));
}

#[tokio::test]
async fn navigation_follows_its_own_switch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/index.html"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string("<html></html>"),
        )
        .expect(1)
        .mount(&server)
        .await;
    let url = Url::parse(&format!("{}/index.html", server.uri())).unwrap();

    // Sub-resources are off by default; documents still load.
    let loader = ResourceLoader::new(LoaderSettings::default()).unwrap();
    let response = loader.navigate(Request::get(url.clone())).await.unwrap();
    assert_eq!(response.text(), "<html></html>");

    let loader = ResourceLoader::new(LoaderSettings::default().with_navigation(false)).unwrap();
    let result = loader.navigate(Request::get(url)).await;
    assert!(matches!(result, Err(NetError::NavigationDisabled)));
}
