//! # Trellis CSS
//!
//! CSS Object Model for the Trellis DOM engine.
//!
//! ## Design Goals
//!
//! 1. **Live rule lists**: rule indices are always derived from the owning
//!    sheet or grouping rule, never cached
//! 2. **Ordering invariants**: `@charset` and `@namespace` mutations are
//!    checked against CSS 2.1 ordering on every insert and removal
//! 3. **Text round trips**: declaration blocks and media lists rebuild from
//!    attribute text and report their own serialization when mutated
//! 4. **Engine seam**: sheets are produced by a [`StyleEngine`] chosen by MIME
//!    type, which also owns the default user-agent sheet

use serde::{Deserialize, Serialize};
use trellis_cssparser::ParserOptions;

pub mod declaration;
pub mod default_sheet;
pub mod engine;
pub mod media;
mod properties;
pub mod rule;
pub mod rule_list;
pub mod sheet;

pub use declaration::{CssDeclaration, CssStyleDeclaration};
pub use default_sheet::DEFAULT_SOURCE;
pub use engine::{
    CssStyleEngine, StyleContext, StyleEngine, StyleOptions, PARSE_END_EVENT, PARSE_START_EVENT,
};
pub use media::MediaList;
pub use properties::is_known_property;
pub use rule::{CssRule, CssRuleKind, CssRuleType, GroupingRule, ImportRule, StyleRule};
pub use rule_list::CssRuleList;
pub use sheet::{CssStyleSheet, SheetInit};

/// Parser configuration for a style engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CssParserOptions {
    /// Keep unrecognized at-rules.
    pub include_unknown_rules: bool,
    /// Keep declarations of unrecognized properties.
    pub include_unknown_declarations: bool,
    /// Keep comments between rules.
    pub keep_comments: bool,
}

impl CssParserOptions {
    /// Grammar switches for the parser.
    pub fn parser_options(&self) -> ParserOptions {
        ParserOptions {
            keep_comments: self.keep_comments,
            include_unknown_rules: self.include_unknown_rules,
        }
    }

    pub fn with_unknown_declarations(mut self, include: bool) -> Self {
        self.include_unknown_declarations = include;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parser_options_deserialize_with_defaults() {
        let options: CssParserOptions =
            serde_json::from_str(r#"{ "keep_comments": true }"#).unwrap();
        assert!(options.keep_comments);
        assert!(!options.include_unknown_rules);
        assert!(options.parser_options().keep_comments);
    }
}
