//! # Trellis Media
//!
//! `<audio>` and `<video>` resource selection for the Trellis DOM.
//!
//! ## Features
//!
//! - **Source tracking**: the `src` attribute drives a cancellable download
//!   through the document's loader
//! - **Stale completion guard**: each download carries a generation number;
//!   completions from superseded downloads are discarded
//! - **Load delay**: completions are registered as pending document work, so
//!   the document's `load` waits for the resource to settle
//! - **Media events**: loadstart, abort, emptied, loadeddata and error go to
//!   the document's event sink
//!
//! ## Architecture
//!
//! ```text
//! Configuration ── register() ──> "audio" / "video" behavior factories
//!                                          │
//! src attribute ── observer ──> MediaElement::update_source
//!                                          │
//!                                  Loader::download ──> Document::delay_load
//! ```

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, trace, warn};
use trellis_common::{DomResult, Event, EventDetail};
use trellis_dom::{BehaviorFactory, Configuration, ElementBehavior, Node};
use trellis_net::{DownloadHandle, NetError, Request, Response};
use url::Url;

// ==================== Errors ====================

/// Why a media element has no resource.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    #[error("Fetch aborted")]
    Aborted,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Media not supported: {0}")]
    NotSupported(String),
}

impl MediaError {
    /// `MediaError.code`.
    pub fn code(&self) -> u16 {
        match self {
            MediaError::Aborted => 1,
            MediaError::Network(_) => 2,
            MediaError::NotSupported(_) => 4,
        }
    }
}

impl From<NetError> for MediaError {
    fn from(error: NetError) -> Self {
        match error {
            NetError::Cancelled => MediaError::Aborted,
            other => MediaError::Network(other.to_string()),
        }
    }
}

// ==================== Media Types ====================

/// Media network state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NetworkState {
    #[default]
    Empty,
    Idle,
    Loading,
    NoSource,
}

/// Media ready state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ReadyState {
    #[default]
    HaveNothing,
    HaveMetadata,
    HaveCurrentData,
    HaveFutureData,
    HaveEnoughData,
}

/// Media preload attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Preload {
    None,
    Metadata,
    #[default]
    Auto,
}

impl Preload {
    fn parse(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("none") => Preload::None,
            Some("metadata") => Preload::Metadata,
            _ => Preload::Auto,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Preload::None => "none",
            Preload::Metadata => "metadata",
            Preload::Auto => "auto",
        }
    }
}

/// Which element a behavior is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub fn local_name(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }
}

/// A fetched media resource.
#[derive(Debug, Clone)]
pub struct MediaResource {
    pub url: Url,
    pub content_type: Option<String>,
    pub data: Bytes,
}

// ==================== Media Events ====================

/// Media events published through the document's event sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaEvent {
    /// Loading started.
    LoadStart,
    /// An unfinished fetch was abandoned.
    Abort,
    /// A loaded resource was dropped.
    Emptied,
    /// The resource arrived.
    LoadedData,
    /// The fetch failed.
    Error,
}

impl MediaEvent {
    pub fn name(&self) -> &'static str {
        match self {
            MediaEvent::LoadStart => "loadstart",
            MediaEvent::Abort => "abort",
            MediaEvent::Emptied => "emptied",
            MediaEvent::LoadedData => "loadeddata",
            MediaEvent::Error => "error",
        }
    }
}

/// Whether a MIME type can be played: `"probably"`, `"maybe"` or `""`.
pub fn can_play_type(mime_type: &str) -> &'static str {
    let essence = mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match essence.as_str() {
        // Audio formats
        "audio/mpeg" | "audio/mp3" => "probably",
        "audio/wav" | "audio/wave" => "probably",
        "audio/ogg" => "probably",
        "audio/flac" => "probably",
        "audio/webm" => "maybe",
        "audio/aac" => "maybe",

        // Video formats
        "video/mp4" => "maybe",
        "video/webm" => "maybe",
        "video/ogg" => "maybe",

        _ => "",
    }
}

/// Register the `audio` and `video` behaviors.
pub fn register(config: Configuration) -> Configuration {
    config
        .with_behavior("audio", MediaElement::factory(MediaKind::Audio))
        .with_behavior("video", MediaElement::factory(MediaKind::Video))
}

// ==================== MediaElement ====================

/// Behavior shared by `audio` and `video` elements.
#[derive(Debug)]
pub struct MediaElement {
    element: Weak<Node>,
    kind: MediaKind,
    network_state: Cell<NetworkState>,
    ready_state: Cell<ReadyState>,
    generation: Cell<u64>,
    download: RefCell<Option<DownloadHandle>>,
    current_src: RefCell<Option<Url>>,
    resource: RefCell<Option<MediaResource>>,
    error: RefCell<Option<MediaError>>,
}

impl MediaElement {
    /// Factory that observes `src` and selects the initial source.
    pub fn factory(kind: MediaKind) -> BehaviorFactory {
        Rc::new(move |element: &Rc<Node>| {
            let media = Rc::new(MediaElement {
                element: Rc::downgrade(element),
                kind,
                network_state: Cell::new(NetworkState::Empty),
                ready_state: Cell::new(ReadyState::HaveNothing),
                generation: Cell::new(0),
                download: RefCell::new(None),
                current_src: RefCell::new(None),
                resource: RefCell::new(None),
                error: RefCell::new(None),
            });
            let weak = Rc::downgrade(&media);
            element.observe_attribute(
                "src",
                Rc::new(move |_: Option<&str>| {
                    if let Some(media) = weak.upgrade() {
                        media.update_source();
                    }
                }),
            );
            media.update_source();
            media as Rc<dyn ElementBehavior>
        })
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn network_state(&self) -> NetworkState {
        self.network_state.get()
    }

    pub fn ready_state(&self) -> ReadyState {
        self.ready_state.get()
    }

    /// Address of the selected source.
    pub fn current_source(&self) -> Option<Url> {
        self.current_src.borrow().clone()
    }

    /// The fetched resource, once loaded.
    pub fn resource(&self) -> Option<MediaResource> {
        self.resource.borrow().clone()
    }

    pub fn error(&self) -> Option<MediaError> {
        self.error.borrow().clone()
    }

    /// Generation of the most recent source selection.
    pub fn generation(&self) -> u64 {
        self.generation.get()
    }

    pub fn can_play_type(&self, mime_type: &str) -> &'static str {
        can_play_type(mime_type)
    }

    /// Restart source selection from the current `src`.
    pub fn load(self: &Rc<Self>) {
        self.update_source();
    }

    fn publish(&self, event: MediaEvent) {
        let Some(element) = self.element.upgrade() else {
            return;
        };
        let Some(events) = element
            .owner_document()
            .and_then(|doc| doc.config().events())
        else {
            return;
        };
        let src = self.current_source().map(|u| u.to_string());
        events.publish(
            Event::trusted(event.name())
                .with_target(Some(element.id()))
                .with_detail(EventDetail::Media { src }),
        );
    }

    /// Cancel the unfinished download, drop any loaded resource and start
    /// fetching the current `src`.
    fn update_source(self: &Rc<Self>) {
        let Some(element) = self.element.upgrade() else {
            return;
        };

        let previous = self.download.borrow_mut().take();
        if let Some(handle) = previous {
            if handle.cancel() {
                debug!(url = %handle.url(), "Cancelled media download");
                self.publish(MediaEvent::Abort);
            }
        }
        if self.resource.borrow_mut().take().is_some() {
            self.ready_state.set(ReadyState::HaveNothing);
            self.publish(MediaEvent::Emptied);
        }
        self.network_state.set(NetworkState::Idle);
        *self.error.borrow_mut() = None;
        let generation = self.generation.get() + 1;
        self.generation.set(generation);
        *self.current_src.borrow_mut() = None;

        let Some(src) = element.get_attribute("src").filter(|s| !s.trim().is_empty()) else {
            return;
        };
        let Some(document) = element.owner_document() else {
            return;
        };
        let Some(loader) = document.config().loader() else {
            trace!(%src, "No loader, media source not fetched");
            return;
        };
        let Some(url) = document.resolve_url(&src) else {
            warn!(%src, "Unresolvable media source");
            self.fail(MediaError::NotSupported(format!("cannot resolve '{}'", src)));
            return;
        };

        *self.current_src.borrow_mut() = Some(url.clone());
        self.network_state.set(NetworkState::Loading);
        self.publish(MediaEvent::LoadStart);
        debug!(%url, generation, kind = self.kind.local_name(), "Fetching media");

        let pending = loader.download(Request::get(url));
        *self.download.borrow_mut() = Some(pending.handle());
        let weak = Rc::downgrade(self);
        document.delay_load(async move {
            let result = pending.result().await;
            if let Some(media) = weak.upgrade() {
                media.complete(generation, result);
            }
        });
    }

    fn complete(&self, generation: u64, result: Result<Response, NetError>) {
        if generation != self.generation.get() {
            debug!(
                generation,
                current = self.generation.get(),
                "Discarding stale media completion"
            );
            return;
        }
        let cancelled = self
            .download
            .borrow_mut()
            .take()
            .is_some_and(|handle| handle.is_cancelled());
        if cancelled {
            return;
        }

        let response = match result {
            Ok(response) if response.ok() => response,
            Ok(response) => {
                self.fail(MediaError::Network(format!("HTTP {}", response.status)));
                return;
            }
            Err(error) => {
                self.fail(error.into());
                return;
            }
        };

        let content_type = response.content_type_or_guess().map(|m| m.essence_str().to_string());
        if let Some(mime) = &content_type {
            if mime != "application/octet-stream" && can_play_type(mime).is_empty() {
                self.fail(MediaError::NotSupported(mime.clone()));
                return;
            }
        }

        debug!(url = %response.url, bytes = response.bytes().len(), "Media loaded");
        *self.resource.borrow_mut() = Some(MediaResource {
            url: response.url.clone(),
            content_type,
            data: response.bytes().clone(),
        });
        self.network_state.set(NetworkState::Idle);
        self.ready_state.set(ReadyState::HaveEnoughData);
        self.publish(MediaEvent::LoadedData);
    }

    fn fail(&self, error: MediaError) {
        debug!(%error, "Media source failed");
        *self.error.borrow_mut() = Some(error);
        self.network_state.set(NetworkState::NoSource);
        self.publish(MediaEvent::Error);
    }

    // ==================== Reflected attributes ====================

    fn flag(&self, name: &str) -> bool {
        self.element
            .upgrade()
            .is_some_and(|element| element.has_attribute(name))
    }

    fn set_flag(&self, name: &str, value: bool) -> DomResult<()> {
        match self.element.upgrade() {
            Some(element) => element.toggle_attribute(name, Some(value)).map(|_| ()),
            None => Ok(()),
        }
    }

    pub fn autoplay(&self) -> bool {
        self.flag("autoplay")
    }

    pub fn set_autoplay(&self, value: bool) -> DomResult<()> {
        self.set_flag("autoplay", value)
    }

    pub fn looping(&self) -> bool {
        self.flag("loop")
    }

    pub fn set_looping(&self, value: bool) -> DomResult<()> {
        self.set_flag("loop", value)
    }

    pub fn controls(&self) -> bool {
        self.flag("controls")
    }

    pub fn set_controls(&self, value: bool) -> DomResult<()> {
        self.set_flag("controls", value)
    }

    /// The `muted` content attribute (`defaultMuted`).
    pub fn default_muted(&self) -> bool {
        self.flag("muted")
    }

    pub fn set_default_muted(&self, value: bool) -> DomResult<()> {
        self.set_flag("muted", value)
    }

    pub fn preload(&self) -> Preload {
        Preload::parse(
            self.element
                .upgrade()
                .and_then(|e| e.get_attribute("preload"))
                .as_deref(),
        )
    }

    pub fn set_preload(&self, preload: Preload) -> DomResult<()> {
        match self.element.upgrade() {
            Some(element) => element.set_attribute("preload", preload.as_str()),
            None => Ok(()),
        }
    }

    /// `anonymous` or `use-credentials`, normalized.
    pub fn cross_origin(&self) -> Option<String> {
        let value = self.element.upgrade()?.get_attribute("crossorigin")?;
        if value.eq_ignore_ascii_case("use-credentials") {
            Some("use-credentials".to_string())
        } else {
            Some("anonymous".to_string())
        }
    }

    pub fn set_cross_origin(&self, value: Option<&str>) -> DomResult<()> {
        let Some(element) = self.element.upgrade() else {
            return Ok(());
        };
        match value {
            Some(value) => element.set_attribute("crossorigin", value),
            None => {
                element.remove_attribute("crossorigin");
                Ok(())
            }
        }
    }
}

impl ElementBehavior for MediaElement {
    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}
