//! Text normalization for values scraped from product pages

use std::sync::LazyLock;

use regex::Regex;

static HANGUL_OR_COLON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[가-힣:]").expect("static regex"));

static NOT_LETTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z가-힣]").expect("static regex"));

/// Parse a displayed price such as `₩ 1,290,000` or `1.290.000원`.
///
/// Only ASCII digits are kept; returns `None` when none are left.
pub fn parse_price(text: &str) -> Option<i64> {
    let digits: String = text.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Strip Hangul labels and colons from a model code (`모델명: 1W2B0K30` → `1W2B0K30`).
pub fn clean_model(text: &str) -> String {
    HANGUL_OR_COLON.replace_all(text, "").trim().to_string()
}

/// Keep only ASCII letters and Hangul syllables.
pub fn letters_only(text: &str) -> String {
    NOT_LETTER.replace_all(text, "").into_owned()
}

/// Collapse runs of whitespace into single spaces and trim.
pub fn squash_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("₩ 1,290,000", Some(1_290_000))]
    #[case("1.290.000원", Some(1_290_000))]
    #[case("  35000 ", Some(35_000))]
    #[case("Sold out", None)]
    #[case("", None)]
    fn price_parsing(#[case] raw: &str, #[case] expected: Option<i64>) {
        assert_eq!(parse_price(raw), expected);
    }

    #[test]
    fn model_cleanup_drops_korean_label() {
        assert_eq!(clean_model("모델명: 1W2B0K30 VSF"), "1W2B0K30 VSF");
        assert_eq!(clean_model("REF 12-AB"), "REF 12-AB");
    }

    #[test]
    fn letters_only_keeps_hangul() {
        assert_eq!(letters_only("블랙 / Black 01"), "블랙Black");
    }

    #[test]
    fn whitespace_is_squashed() {
        assert_eq!(squash_whitespace("  Locò \n  small\tbag "), "Locò small bag");
    }
}
