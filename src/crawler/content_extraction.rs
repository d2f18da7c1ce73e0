//! Content extraction functionality for the crawler module

use crate::crawler::error::ExtractionFailed;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::debug;

/// Elements that never carry readable content
const NON_CONTENT_SELECTOR: &str = "script, style, iframe, noscript";

/// Page chrome around the main content
const CHROME_SELECTOR: &str = "header, footer, nav, aside";

/// Containers that usually hold the primary content of a page
const CANDIDATE_SELECTOR: &str = "article, main, div.content, div.post, div.entry";

fn hidden_style() -> &'static Regex {
    static HIDDEN: OnceLock<Regex> = OnceLock::new();
    HIDDEN.get_or_init(|| Regex::new(r"display:\s*none").expect("valid hidden style pattern"))
}

fn whitespace_run() -> &'static Regex {
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();
    WHITESPACE.get_or_init(|| Regex::new(r"\s+").expect("valid whitespace pattern"))
}

fn residual_tag() -> &'static Regex {
    static TAG: OnceLock<Regex> = OnceLock::new();
    TAG.get_or_init(|| Regex::new(r"<[^>]+>").expect("valid tag pattern"))
}

/// Text and metadata pulled out of a page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedPage {
    /// Visible text of the main content block
    pub content: String,

    /// Title of the page
    pub title: String,

    /// Short description of the page
    pub description: String,
}

impl ExtractedPage {
    /// Prefer metadata captured during acquisition, falling back to the
    /// values found in the markup
    pub fn merge_rendered(mut self, title: Option<&str>, description: Option<&str>) -> Self {
        if let Some(title) = title.filter(|t| !t.trim().is_empty()) {
            self.title = title.to_string();
        }
        if let Some(description) = description.filter(|d| !d.trim().is_empty()) {
            self.description = description.to_string();
        }
        self
    }
}

/// Result of running extraction over a page
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// Extracted fields, empty where nothing was found
    pub page: ExtractedPage,

    /// Set when extraction degraded; callers log it and carry on
    pub failure: Option<ExtractionFailed>,
}

fn selector(css: &str) -> Result<Selector, ExtractionFailed> {
    Selector::parse(css)
        .map_err(|e| ExtractionFailed::Selector(format!("Failed to parse '{}': {}", css, e)))
}

/// Extract the main content, title and description from raw markup.
///
/// This never fails outright. When the markup is empty or no visible text can
/// be located, the returned `Extraction` carries an `ExtractionFailed` next to
/// whatever fields could still be filled.
pub fn extract(raw_markup: &str) -> Extraction {
    if raw_markup.trim().is_empty() {
        return Extraction {
            page: ExtractedPage::default(),
            failure: Some(ExtractionFailed::EmptyMarkup),
        };
    }

    let mut document = Html::parse_document(raw_markup);

    let (title, description) = match read_metadata(&document) {
        Ok(metadata) => metadata,
        Err(e) => {
            return Extraction {
                page: ExtractedPage::default(),
                failure: Some(e),
            };
        }
    };

    let content = match strip_non_content(&mut document).and_then(|_| main_text(&document)) {
        Ok(content) => content,
        Err(e) => {
            return Extraction {
                page: ExtractedPage::default(),
                failure: Some(e),
            };
        }
    };

    let failure = content.is_empty().then_some(ExtractionFailed::NoText);

    Extraction {
        page: ExtractedPage {
            content,
            title,
            description,
        },
        failure,
    }
}

/// Extract the title and description of a page
///
/// # Returns
///
/// `(title, description)`, each empty when the page does not declare it
pub fn extract_metadata(html: &str) -> Result<(String, String), ExtractionFailed> {
    read_metadata(&Html::parse_document(html))
}

fn read_metadata(document: &Html) -> Result<(String, String), ExtractionFailed> {
    let title_selector = selector("title")?;
    let title = document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .unwrap_or_default();

    let description_selector = selector("meta[name='description']")?;
    let og_description_selector = selector("meta[property='og:description']")?;

    let meta_content = |meta: &Selector| {
        document
            .select(meta)
            .next()
            .and_then(|element| element.value().attr("content"))
            .filter(|content| !content.is_empty())
            .map(str::to_string)
    };

    let description = meta_content(&description_selector)
        .or_else(|| meta_content(&og_description_selector))
        .unwrap_or_default();

    Ok((title, description))
}

/// Detach scripts, hidden elements, page chrome and comments from the tree
fn strip_non_content(document: &mut Html) -> Result<(), ExtractionFailed> {
    let non_content = selector(NON_CONTENT_SELECTOR)?;
    let chrome = selector(CHROME_SELECTOR)?;
    let styled = selector("[style]")?;

    let mut doomed = Vec::new();
    doomed.extend(document.select(&non_content).map(|element| element.id()));
    doomed.extend(
        document
            .select(&styled)
            .filter(|element| {
                element
                    .value()
                    .attr("style")
                    .is_some_and(|style| hidden_style().is_match(style))
            })
            .map(|element| element.id()),
    );
    doomed.extend(document.select(&chrome).map(|element| element.id()));
    doomed.extend(
        document
            .tree
            .nodes()
            .filter(|node| node.value().is_comment())
            .map(|node| node.id()),
    );

    debug!("Removing {} non-content nodes", doomed.len());
    for id in doomed {
        if let Some(mut node) = document.tree.get_mut(id) {
            node.detach();
        }
    }

    Ok(())
}

/// Text of the largest candidate block, or of the body when there is none
fn main_text(document: &Html) -> Result<String, ExtractionFailed> {
    let candidates = selector(CANDIDATE_SELECTOR)?;

    // Strictly larger wins, so ties go to the first block in document order
    let mut largest: Option<(usize, ElementRef)> = None;
    for element in document.select(&candidates) {
        let size = element.html().chars().count();
        if largest.as_ref().is_none_or(|(best, _)| size > *best) {
            largest = Some((size, element));
        }
    }

    let block = match largest {
        Some((_, element)) => Some(element),
        None => {
            let body = selector("body")?;
            document.select(&body).next()
        }
    };

    Ok(block.map(visible_text).unwrap_or_default())
}

fn visible_text(element: ElementRef) -> String {
    let joined = element
        .text()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    let collapsed = whitespace_run().replace_all(&joined, " ");
    residual_tag().replace_all(&collapsed, "").trim().to_string()
}
