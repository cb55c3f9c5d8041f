//! The CSS style engine.
//!
//! Builds style sheets, inline declarations and media lists from text, owns
//! the default user-agent sheet and resolves `@import` rules through the
//! caller's loader.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, trace, warn};
use trellis_common::{Event, EventDetail, EventSink, NodeId, TaskScheduler};
use trellis_cssparser::{parse_stylesheet, StylesheetAst};
use trellis_net::{Loader, Request, Response};
use url::Url;

use crate::declaration::CssStyleDeclaration;
use crate::default_sheet::DEFAULT_AST;
use crate::media::MediaList;
use crate::rule::CssRule;
use crate::sheet::{CssStyleSheet, SheetInit};
use crate::CssParserOptions;

/// Event published before a sheet's rules are parsed.
pub const PARSE_START_EVENT: &str = "cssparsestart";
/// Event published once a sheet's own rules are in place.
pub const PARSE_END_EVENT: &str = "cssparseend";

/// Imports nested deeper than this are not fetched.
const MAX_IMPORT_DEPTH: usize = 16;

/// Collaborators a parse may use: event publication and nested resource
/// loading.
#[derive(Clone, Default)]
pub struct StyleContext {
    pub events: Option<Rc<dyn EventSink>>,
    pub loader: Option<Rc<dyn Loader>>,
    pub scheduler: Option<Rc<dyn TaskScheduler>>,
}

impl fmt::Debug for StyleContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StyleContext")
            .field("events", &self.events.is_some())
            .field("loader", &self.loader.is_some())
            .field("scheduler", &self.scheduler.is_some())
            .finish()
    }
}

/// Per-call parse parameters.
#[derive(Debug, Clone, Default)]
pub struct StyleOptions {
    element: Option<NodeId>,
    context: Option<StyleContext>,
    base_url: Option<Url>,
    title: Option<String>,
    disabled: bool,
    alternate: bool,
    import_depth: usize,
}

impl StyleOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Element the resulting sheet belongs to.
    pub fn with_element(mut self, element: NodeId) -> Self {
        self.element = Some(element);
        self
    }

    /// Enclosing collaborators.
    pub fn with_context(mut self, context: StyleContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Base address for relative references in inline sources.
    pub fn with_base_url(mut self, base_url: Option<Url>) -> Self {
        self.base_url = base_url;
        self
    }

    pub fn with_title(mut self, title: Option<String>) -> Self {
        self.title = title;
        self
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    pub fn alternate(mut self, alternate: bool) -> Self {
        self.alternate = alternate;
        self
    }

    pub fn element(&self) -> Option<NodeId> {
        self.element
    }

    pub fn context(&self) -> Option<&StyleContext> {
        self.context.as_ref()
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn is_alternate(&self) -> bool {
        self.alternate
    }

    fn events(&self) -> Option<Rc<dyn EventSink>> {
        self.context.as_ref().and_then(|c| c.events.clone())
    }
}

/// A style language implementation, registered by MIME type.
pub trait StyleEngine {
    /// MIME type handled by this engine.
    fn mime_type(&self) -> &str;

    /// Build a sheet from source text.
    fn parse_stylesheet(&self, source: &str, options: &StyleOptions) -> Rc<CssStyleSheet>;

    /// Build a sheet from a fetched response. The response URL becomes the
    /// sheet's address.
    fn parse_stylesheet_from_response(
        &self,
        response: &Response,
        options: &StyleOptions,
    ) -> Rc<CssStyleSheet>;

    /// Build a declaration block, as for a `style` attribute.
    fn parse_inline(&self, source: &str, options: &StyleOptions) -> Rc<CssStyleDeclaration>;

    /// Build a media list.
    fn parse_media(&self, source: &str, options: &StyleOptions) -> Rc<MediaList>;

    /// The user-agent default sheet.
    fn default_stylesheet(&self) -> Rc<CssStyleSheet>;
}

/// Engine for `text/css`.
#[derive(Debug, Clone, Default)]
pub struct CssStyleEngine {
    options: CssParserOptions,
    default: Rc<RefCell<Option<Rc<CssStyleSheet>>>>,
}

impl CssStyleEngine {
    pub fn new(options: CssParserOptions) -> Self {
        Self {
            options,
            default: Rc::default(),
        }
    }

    pub fn options(&self) -> CssParserOptions {
        self.options
    }

    /// Replace the default sheet with one parsed from `source`.
    pub fn set_default(&self, source: &str) -> Rc<CssStyleSheet> {
        let sheet = self.sheet_from_ast(
            parse_stylesheet(source, self.options.parser_options()),
            SheetInit::default(),
        );
        *self.default.borrow_mut() = Some(sheet.clone());
        sheet
    }

    fn sheet_from_ast(&self, ast: StylesheetAst, init: SheetInit) -> Rc<CssStyleSheet> {
        let sheet = CssStyleSheet::new(SheetInit {
            options: self.options,
            ..init
        });
        sheet.css_rules().populate(ast.nodes, self.options);
        sheet
    }

    fn build(&self, source: &str, init: SheetInit, options: &StyleOptions) -> Rc<CssStyleSheet> {
        let events = options.events();
        let href = init.href.as_ref().map(|u| u.to_string());
        let sheet = CssStyleSheet::new(SheetInit {
            options: self.options,
            ..init
        });

        if let Some(events) = &events {
            events.publish(
                Event::trusted(PARSE_START_EVENT)
                    .with_target(options.element)
                    .with_detail(EventDetail::StyleSheet {
                        href: href.clone(),
                        rule_count: 0,
                    }),
            );
        }

        trace!(len = source.len(), href = ?href, "Parsing style sheet");
        let ast = parse_stylesheet(source, self.options.parser_options());
        sheet.css_rules().populate(ast.nodes, self.options);
        self.load_imports(&sheet, options);

        let rule_count = sheet.css_rules().len();
        debug!(rule_count, href = ?href, "Style sheet parsed");

        if let Some(events) = &events {
            events.publish(
                Event::trusted(PARSE_END_EVENT)
                    .with_target(options.element)
                    .with_detail(EventDetail::StyleSheet { href, rule_count }),
            );
        }
        sheet
    }

    /// Schedule fetches for the sheet's `@import` rules. Parsing does not wait
    /// for them.
    fn load_imports(&self, sheet: &Rc<CssStyleSheet>, options: &StyleOptions) {
        let Some(context) = options.context() else {
            return;
        };
        let (Some(loader), Some(scheduler)) = (&context.loader, &context.scheduler) else {
            return;
        };

        for rule in sheet.css_rules().rules() {
            let Some(import) = rule.as_import() else {
                continue;
            };
            if options.import_depth >= MAX_IMPORT_DEPTH {
                warn!(href = import.href(), "Import nesting too deep, skipping");
                continue;
            }
            let Some(url) = sheet.resolve(import.href()) else {
                warn!(href = import.href(), "Unresolvable @import address");
                continue;
            };

            debug!(url = %url, "Fetching imported style sheet");
            let mut request = Request::get(url);
            if let Some(referrer) = sheet.href() {
                request = request.referrer(referrer.clone());
            }
            let download = loader.download(request);

            let engine = self.clone();
            let rule: Weak<CssRule> = Rc::downgrade(&rule);
            let child_options = StyleOptions {
                element: None,
                import_depth: options.import_depth + 1,
                base_url: None,
                title: None,
                disabled: false,
                alternate: false,
                context: options.context.clone(),
            };

            scheduler.schedule(Box::pin(async move {
                let response = match download.result().await {
                    Ok(response) if response.ok() => response,
                    Ok(response) => {
                        warn!(url = %response.url, status = %response.status, "Import fetch failed");
                        return;
                    }
                    Err(e) => {
                        warn!(error = %e, "Import fetch failed");
                        return;
                    }
                };
                let Some(rule) = rule.upgrade() else {
                    trace!("Import rule dropped before fetch completed");
                    return;
                };
                let imported = engine.parse_stylesheet_from_response(&response, &child_options);
                imported.set_owner_rule(&rule);
                if let Some(import) = rule.as_import() {
                    import.set_style_sheet(imported);
                }
            }));
        }
    }
}

impl StyleEngine for CssStyleEngine {
    fn mime_type(&self) -> &str {
        "text/css"
    }

    fn parse_stylesheet(&self, source: &str, options: &StyleOptions) -> Rc<CssStyleSheet> {
        let init = SheetInit {
            href: None,
            base_url: options.base_url.clone(),
            owner_node: options.element,
            title: options.title.clone(),
            disabled: options.disabled,
            alternate: options.alternate,
            options: self.options,
        };
        self.build(source, init, options)
    }

    fn parse_stylesheet_from_response(
        &self,
        response: &Response,
        options: &StyleOptions,
    ) -> Rc<CssStyleSheet> {
        let init = SheetInit {
            href: Some(response.url.clone()),
            base_url: Some(response.url.clone()),
            owner_node: options.element,
            title: options.title.clone(),
            disabled: options.disabled,
            alternate: options.alternate,
            options: self.options,
        };
        self.build(&response.text(), init, options)
    }

    fn parse_inline(&self, source: &str, _options: &StyleOptions) -> Rc<CssStyleDeclaration> {
        Rc::new(CssStyleDeclaration::parse(source, self.options))
    }

    fn parse_media(&self, source: &str, _options: &StyleOptions) -> Rc<MediaList> {
        Rc::new(MediaList::parse(source))
    }

    fn default_stylesheet(&self) -> Rc<CssStyleSheet> {
        if let Some(sheet) = self.default.borrow().as_ref() {
            return sheet.clone();
        }
        let sheet = self.sheet_from_ast((*DEFAULT_AST).clone(), SheetInit::default());
        debug!(rule_count = sheet.css_rules().len(), "Default style sheet built");
        *self.default.borrow_mut() = Some(sheet.clone());
        sheet
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_common::RecordingSink;

    #[test]
    fn test_parse_stylesheet_publishes_events() {
        let sink = Rc::new(RecordingSink::new());
        let context = StyleContext {
            events: Some(sink.clone()),
            ..Default::default()
        };
        let options = StyleOptions::new()
            .with_element(NodeId::new(7))
            .with_context(context)
            .disabled(true);

        let engine = CssStyleEngine::default();
        let sheet = engine.parse_stylesheet("p{color:red} a{color:blue}", &options);

        assert_eq!(sheet.css_rules().len(), 2);
        assert!(sheet.is_disabled());
        assert_eq!(sheet.owner_node(), Some(NodeId::new(7)));

        let events = sink.take();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, PARSE_START_EVENT);
        assert_eq!(events[1].event_type, PARSE_END_EVENT);
        assert_eq!(events[1].target, Some(NodeId::new(7)));
        assert_eq!(
            events[1].detail,
            EventDetail::StyleSheet {
                href: None,
                rule_count: 2
            }
        );
    }

    #[test]
    fn test_default_stylesheet_is_cached() {
        let engine = CssStyleEngine::default();
        let first = engine.default_stylesheet();
        let second = engine.default_stylesheet();
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(first.css_rules().len(), 49);
        assert!(first.owner_node().is_none());

        let clone = engine.clone();
        assert!(Rc::ptr_eq(&clone.default_stylesheet(), &first));
    }

    #[test]
    fn test_set_default_replaces_sheet() {
        let engine = CssStyleEngine::default();
        let before = engine.default_stylesheet();
        engine.set_default("body { margin: 0 }");
        let after = engine.default_stylesheet();
        assert!(!Rc::ptr_eq(&before, &after));
        assert_eq!(after.css_text(), "body { margin: 0; }");
    }

    #[test]
    fn test_parse_from_response_uses_url() {
        let url = Url::parse("https://example.com/css/site.css").unwrap();
        let response = Response::new(
            trellis_net::RequestId::new(),
            url.clone(),
            Some(mime::TEXT_CSS),
            bytes::Bytes::from_static(b"h1 { font-size: 2em }"),
        );
        let engine = CssStyleEngine::default();
        let sheet = engine.parse_stylesheet_from_response(&response, &StyleOptions::new());
        assert_eq!(sheet.href(), Some(&url));
        assert_eq!(sheet.css_rules().len(), 1);
    }

    #[test]
    fn test_inline_and_media() {
        let engine = CssStyleEngine::default();
        let style = engine.parse_inline("color: red; width: 10px", &StyleOptions::new());
        assert_eq!(style.len(), 2);
        let media = engine.parse_media("screen, print", &StyleOptions::new());
        assert_eq!(media.media_text(), "screen, print");
    }
}
