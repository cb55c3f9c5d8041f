//! Source selection against controllable loaders.

use std::cell::RefCell;
use std::rc::Rc;

use bytes::Bytes;
use trellis_common::{init_logging, LogConfig, RecordingSink};
use trellis_dom::{Configuration, Document, DocumentReadyState};
use trellis_media::{MediaElement, MediaError, NetworkState, Preload, ReadyState};
use trellis_net::{
    DownloadCompleter, Loader, PendingDownload, Request, RequestId, Response, StaticLoader,
};
use url::Url;

/// Loader whose downloads complete only when the test says so.
#[derive(Default)]
struct ManualLoader {
    pending: RefCell<Vec<(Url, DownloadCompleter)>>,
}

impl ManualLoader {
    fn take(&self, path: &str) -> (Url, DownloadCompleter) {
        let mut pending = self.pending.borrow_mut();
        let index = pending
            .iter()
            .position(|(url, _)| url.path() == path)
            .expect("download was not started");
        pending.remove(index)
    }
}

impl Loader for ManualLoader {
    fn download(&self, request: Request) -> PendingDownload {
        let (pending, completer) = PendingDownload::new(&request);
        self.pending
            .borrow_mut()
            .push((request.url.clone(), completer));
        pending
    }
}

fn video_response(url: Url, body: &'static str) -> Response {
    Response::new(
        RequestId::new(),
        url,
        Some("video/mp4".parse().unwrap()),
        Bytes::from_static(body.as_bytes()),
    )
}

fn page(body: &str, config: Configuration) -> Document {
    init_logging(LogConfig::for_tests());
    Document::parse_html_with_url(
        &format!("<html><body>{}</body></html>", body),
        Url::parse("https://media.test/page.html").unwrap(),
        trellis_media::register(config),
    )
    .unwrap()
}

fn media_of(doc: &Document, selector: &str) -> (Rc<trellis_dom::Node>, Rc<MediaElement>) {
    let element = doc.query_selector(selector).unwrap().unwrap();
    let media = element.behavior::<MediaElement>().unwrap();
    (element, media)
}

#[tokio::test]
async fn stale_completion_does_not_overwrite_newer_source() {
    let loader = Rc::new(ManualLoader::default());
    let doc = page(
        r#"<video src="x.mp4"></video>"#,
        Configuration::default().with_loader(loader.clone()),
    );
    let (video, media) = media_of(&doc, "video");
    assert_eq!(media.network_state(), NetworkState::Loading);
    let first_generation = media.generation();

    let (x_url, x) = loader.take("/x.mp4");
    video.set_attribute("src", "y.mp4").unwrap();
    assert!(x.handle().is_cancelled());
    assert!(media.generation() > first_generation);
    assert_eq!(media.network_state(), NetworkState::Loading);

    // Y settles first, then the cancelled X download completes anyway.
    let (y_url, y) = loader.take("/y.mp4");
    y.complete(Ok(video_response(y_url, "Y")));
    x.complete(Ok(video_response(x_url, "X")));
    doc.wait_until_loaded().await;

    let resource = media.resource().unwrap();
    assert_eq!(resource.data, Bytes::from_static(b"Y"));
    assert_eq!(resource.url.path(), "/y.mp4");
    assert_eq!(media.current_source().unwrap().path(), "/y.mp4");
    assert_eq!(media.network_state(), NetworkState::Idle);
    assert_eq!(media.ready_state(), ReadyState::HaveEnoughData);
}

#[tokio::test]
async fn load_waits_for_media_download() {
    let loader = Rc::new(ManualLoader::default());
    let events = Rc::new(RecordingSink::new());
    let doc = page(
        r#"<audio src="song.mp3"></audio>"#,
        Configuration::default()
            .with_loader(loader.clone())
            .with_events(events.clone()),
    );
    assert_eq!(doc.pending_tasks(), 1);
    assert_eq!(doc.ready_state(), DocumentReadyState::Interactive);

    let (url, completer) = loader.take("/song.mp3");
    let response = Response::new(
        RequestId::new(),
        url,
        Some("audio/mpeg".parse().unwrap()),
        Bytes::from_static(b"ID3"),
    );
    completer.complete(Ok(response));
    doc.wait_until_loaded().await;

    assert_eq!(doc.ready_state(), DocumentReadyState::Complete);
    assert_eq!(
        events.event_types(),
        vec!["loadstart", "loadeddata", "load"]
    );
}

#[tokio::test]
async fn failed_download_sets_no_source() {
    let events = Rc::new(RecordingSink::new());
    let doc = page(
        r#"<video src="missing.mp4"></video>"#,
        Configuration::default()
            .with_loader(Rc::new(StaticLoader::new()))
            .with_events(events.clone()),
    );
    doc.wait_until_loaded().await;

    let (_, media) = media_of(&doc, "video");
    assert_eq!(media.network_state(), NetworkState::NoSource);
    assert!(matches!(media.error(), Some(MediaError::Network(_))));
    assert!(media.resource().is_none());
    assert!(events.event_types().contains(&"error".to_string()));
}

#[tokio::test]
async fn unsupported_content_type_is_rejected() {
    let loader = StaticLoader::new().with(
        "https://media.test/clip.mp4",
        Some(mime::TEXT_HTML),
        "<html></html>",
    );
    let doc = page(
        r#"<video src="clip.mp4"></video>"#,
        Configuration::default().with_loader(Rc::new(loader)),
    );
    doc.wait_until_loaded().await;

    let (_, media) = media_of(&doc, "video");
    assert_eq!(media.network_state(), NetworkState::NoSource);
    assert_eq!(
        media.error(),
        Some(MediaError::NotSupported("text/html".to_string()))
    );
}

#[tokio::test]
async fn removing_src_empties_the_element() {
    let loader = StaticLoader::new().with(
        "https://media.test/a.mp3",
        Some("audio/mpeg".parse().unwrap()),
        "data",
    );
    let events = Rc::new(RecordingSink::new());
    let doc = page(
        r#"<audio src="a.mp3"></audio>"#,
        Configuration::default()
            .with_loader(Rc::new(loader))
            .with_events(events.clone()),
    );
    doc.wait_until_loaded().await;

    let (audio, media) = media_of(&doc, "audio");
    assert!(media.resource().is_some());

    audio.remove_attribute("src");
    assert!(media.resource().is_none());
    assert!(media.current_source().is_none());
    assert_eq!(media.network_state(), NetworkState::Idle);
    assert_eq!(media.ready_state(), ReadyState::HaveNothing);
    assert_eq!(events.event_types().last().map(String::as_str), Some("emptied"));
}

#[test]
fn without_loader_the_element_stays_idle() {
    let doc = page(r#"<audio src="a.mp3"></audio>"#, Configuration::default());
    let (_, media) = media_of(&doc, "audio");
    assert_eq!(media.network_state(), NetworkState::Idle);
    assert!(media.current_source().is_none());
    assert_eq!(doc.pending_tasks(), 0);
}

#[tokio::test]
async fn failed_source_replaces_the_current_one() {
    let loader = StaticLoader::new().with(
        "https://media.test/a.mp3",
        Some("audio/mpeg".parse().unwrap()),
        "data",
    );
    let doc = page(
        r#"<audio src="a.mp3"></audio>"#,
        Configuration::default().with_loader(Rc::new(loader)),
    );
    doc.wait_until_loaded().await;
    let (audio, media) = media_of(&doc, "audio");
    assert_eq!(media.current_source().unwrap().path(), "/a.mp3");

    audio.set_attribute("src", "http://[bad").unwrap();
    assert!(media.current_source().is_none());
    assert!(media.resource().is_none());
    assert!(matches!(media.error(), Some(MediaError::NotSupported(_))));
    assert_eq!(media.network_state(), NetworkState::NoSource);
}

#[test]
fn reflected_attributes() {
    let doc = page("<video></video>", Configuration::default());
    let (video, media) = media_of(&doc, "video");

    media.set_autoplay(true).unwrap();
    media.set_looping(true).unwrap();
    assert!(video.has_attribute("autoplay"));
    assert!(media.looping());
    media.set_autoplay(false).unwrap();
    assert!(!video.has_attribute("autoplay"));

    assert_eq!(media.preload(), Preload::Auto);
    media.set_preload(Preload::Metadata).unwrap();
    assert_eq!(video.get_attribute("preload").as_deref(), Some("metadata"));

    video.set_attribute("crossorigin", "").unwrap();
    assert_eq!(media.cross_origin().as_deref(), Some("anonymous"));
    media.set_cross_origin(None).unwrap();
    assert!(media.cross_origin().is_none());

    assert_eq!(media.can_play_type("audio/ogg"), "probably");
}
