//! CSS selector queries over fetched HTML
//!
//! `scraper::Html` is not `Send`, so documents are kept as source text and
//! parsed inside these synchronous helpers, never across an `.await`.

use scraper::{ElementRef, Html, Selector};

use crate::domain::text::squash_whitespace;
use crate::error::{ScrapeError, ScrapeResult};

fn parse_selector(selector: &str) -> ScrapeResult<Selector> {
    Selector::parse(selector).map_err(|e| ScrapeError::InvalidSelector {
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

fn with_nth<T>(
    source: &str,
    selector: &str,
    nth: usize,
    read: impl FnOnce(ElementRef<'_>) -> T,
) -> ScrapeResult<T> {
    let parsed = parse_selector(selector)?;
    let document = Html::parse_document(source);
    document
        .select(&parsed)
        .nth(nth)
        .map(read)
        .ok_or_else(|| ScrapeError::element_missing(selector, nth))
}

pub fn count(source: &str, selector: &str) -> ScrapeResult<usize> {
    let parsed = parse_selector(selector)?;
    let document = Html::parse_document(source);
    Ok(document.select(&parsed).count())
}

/// Visible text of the `nth` match, whitespace collapsed.
pub fn text(source: &str, selector: &str, nth: usize) -> ScrapeResult<String> {
    with_nth(source, selector, nth, |el| {
        squash_whitespace(&el.text().collect::<String>())
    })
}

pub fn attribute(
    source: &str,
    selector: &str,
    nth: usize,
    name: &str,
) -> ScrapeResult<Option<String>> {
    with_nth(source, selector, nth, |el| {
        el.value().attr(name).map(str::to_string)
    })
}

/// Whether the `nth` match exists and is not hidden by markup.
pub fn is_present(source: &str, selector: &str, nth: usize) -> ScrapeResult<bool> {
    match with_nth(source, selector, nth, |el| {
        let value = el.value();
        let hidden_attr = value.attr("hidden").is_some();
        let hidden_class = value.classes().any(|c| c == "hidden");
        let hidden_style = value
            .attr("style")
            .is_some_and(|s| s.replace(' ', "").contains("display:none"));
        !(hidden_attr || hidden_class || hidden_style)
    }) {
        Ok(visible) => Ok(visible),
        Err(ScrapeError::ElementMissing { .. }) => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <ul class="grid">
            <li><a class="tile" href="/p/1">  Locò
                 shoulder bag </a></li>
            <li><a class="tile" href="/p/2">VLogo</a></li>
          </ul>
          <button class="more hidden">Load more</button>
          <p id="price">₩ 3,150,000</p>
        </body></html>
    "#;

    #[test]
    fn counts_and_reads_matches() {
        assert_eq!(count(PAGE, "a.tile").unwrap(), 2);
        assert_eq!(text(PAGE, "a.tile", 0).unwrap(), "Locò shoulder bag");
        assert_eq!(
            attribute(PAGE, "a.tile", 1, "href").unwrap().as_deref(),
            Some("/p/2")
        );
        assert_eq!(attribute(PAGE, "a.tile", 1, "title").unwrap(), None);
    }

    #[test]
    fn missing_match_is_reported_with_index() {
        let err = text(PAGE, "a.tile", 5).unwrap_err();
        assert_eq!(err, ScrapeError::element_missing("a.tile", 5));
    }

    #[test]
    fn hidden_markup_is_not_present() {
        assert!(!is_present(PAGE, "button.more", 0).unwrap());
        assert!(is_present(PAGE, "#price", 0).unwrap());
        assert!(!is_present(PAGE, "#absent", 0).unwrap());
    }

    #[test]
    fn bad_selector_is_rejected() {
        assert!(matches!(
            count(PAGE, "a[[["),
            Err(ScrapeError::InvalidSelector { .. })
        ));
    }
}
