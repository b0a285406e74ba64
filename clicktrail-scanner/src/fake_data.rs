// Passive placeholder-content checks for rendered pages

use crate::result::FakeDataFinding;
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use std::collections::HashSet;

/// Characters of context captured on each side of a match.
const CONTEXT_CHARS: usize = 40;

const RULES: &[(&str, &str)] = &[
    ("lorem_ipsum", r"\blorem\s+ipsum\b|\blorem\b|\bipsum\b"),
    ("placeholder", r"\bplaceholder\b"),
    ("dummy", r"\bdummy\b"),
    ("tbd", r"\bTBD\b"),
    ("replaceme", r"\bREPLACE[_\s-]?ME\b"),
    ("template_token", r"\{\{[^{}]{0,80}\}\}"),
    ("date_format", r"\bMM/DD/YYYY\b|\bDD/MM/YYYY\b"),
    ("year_placeholder", r"\bYYYY\b"),
    ("example_domain", r"\bexample\.(?:com|org|net)\b"),
    (
        "placeholder_email",
        r"\b(?:your|you|name|user|email|test|john\.?doe|jane\.?doe)@(?:email|example|domain|test|company|yourdomain)\.(?:com|org|net)\b",
    ),
    (
        "phone_number",
        r"\(?\b555\)?[-.\s]?\d{3}[-.\s]\d{4}\b|\b555[-.]\d{4}\b|\b123[-.\s]?456[-.\s]?7890\b|\(?\b000\)?[-.\s]?000[-.\s]?0000\b|\(?\bxxx\)?[-.\s]?xxx[-.\s]xxxx\b",
    ),
];

/// Rules that only make sense against page markup (attribute values).
const MARKUP_RULES: &[(&str, &str)] = &[
    (
        "image_placeholder",
        r"image[-_]placeholder|placeholder\.(?:png|jpe?g|svg|webp)|via\.placeholder\.com",
    ),
    ("bare_hash_href", r#"href\s*=\s*["']#["']"#),
];

struct Rule {
    name: &'static str,
    regex: Regex,
}

fn compile(rules: &[(&'static str, &str)]) -> Vec<Rule> {
    rules
        .iter()
        .map(|&(name, pattern)| Rule {
            name,
            regex: RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .expect("built-in fake-data pattern must compile"),
        })
        .collect()
}

static COMPILED_RULES: Lazy<Vec<Rule>> = Lazy::new(|| compile(RULES));
static COMPILED_MARKUP_RULES: Lazy<Vec<Rule>> = Lazy::new(|| compile(MARKUP_RULES));

/// A single placeholder match, before it is attributed to a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeDataMatch {
    pub pattern: &'static str,
    pub matched_text: String,
    pub context: String,
}

/// Names of every rule, text rules first, in evaluation order.
pub fn rule_names() -> Vec<&'static str> {
    RULES
        .iter()
        .chain(MARKUP_RULES)
        .map(|(name, _)| *name)
        .collect()
}

/// Scan rendered text for placeholder content.
///
/// Rules are evaluated in a fixed order and every rule reports its own
/// matches. Repeats of the same text under the same rule collapse onto the
/// first occurrence.
pub fn scan(rendered_text: &str) -> Vec<FakeDataMatch> {
    apply(&COMPILED_RULES, rendered_text)
}

/// Scan page markup for placeholder images and bare `#` hrefs.
///
/// Only the markup rules run here; text rules stay on rendered text so
/// attributes such as `placeholder="Search"` are not reported.
pub fn scan_markup(html: &str) -> Vec<FakeDataMatch> {
    apply(&COMPILED_MARKUP_RULES, html)
}

fn apply(rules: &[Rule], haystack: &str) -> Vec<FakeDataMatch> {
    let mut matches = Vec::new();
    let mut seen: HashSet<(&'static str, String)> = HashSet::new();

    for rule in rules {
        for found in rule.regex.find_iter(haystack) {
            let key = (rule.name, found.as_str().to_lowercase());
            if !seen.insert(key) {
                continue;
            }

            matches.push(FakeDataMatch {
                pattern: rule.name,
                matched_text: found.as_str().to_string(),
                context: surrounding_context(haystack, found.start(), found.end()),
            });
        }
    }

    matches
}

/// Scan a page's text and markup and attribute each match to the page and
/// viewport. Text findings come first.
pub fn scan_page(page: &str, viewport: &str, rendered_text: &str, html: &str) -> Vec<FakeDataFinding> {
    scan(rendered_text)
        .into_iter()
        .chain(scan_markup(html))
        .map(|m| FakeDataFinding {
            page: page.to_string(),
            viewport: viewport.to_string(),
            pattern: m.pattern.to_string(),
            matched_text: m.matched_text,
            surrounding_context: m.context,
        })
        .collect()
}

fn surrounding_context(text: &str, start: usize, end: usize) -> String {
    let from = text[..start]
        .char_indices()
        .rev()
        .nth(CONTEXT_CHARS - 1)
        .map(|(i, _)| i)
        .unwrap_or(0);
    let to = text[end..]
        .char_indices()
        .nth(CONTEXT_CHARS)
        .map(|(i, _)| end + i)
        .unwrap_or(text.len());

    text[from..to].split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns(text: &str) -> Vec<&'static str> {
        scan(text).into_iter().map(|m| m.pattern).collect()
    }

    #[test]
    fn clean_text_has_no_findings() {
        assert!(scan("Welcome to our pricing page. Plans start at $9 per month.").is_empty());
        assert!(scan("").is_empty());
    }

    #[test]
    fn detects_placeholder_email() {
        let found = scan("Contact us at your@email.com for support");
        let email = found
            .iter()
            .find(|m| m.pattern == "placeholder_email")
            .expect("email placeholder should be flagged");
        assert_eq!(email.matched_text, "your@email.com");
        assert_eq!(email.context, "Contact us at your@email.com for support");
    }

    #[test]
    fn detects_lorem_ipsum_case_insensitively() {
        let found = scan("LOREM IPSUM dolor sit amet");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].pattern, "lorem_ipsum");
        assert_eq!(found[0].matched_text, "LOREM IPSUM");
    }

    #[test]
    fn detects_template_tokens_and_dates() {
        let found = patterns("Hello {{ user.name }}, your trial ends MM/DD/YYYY");
        assert!(found.contains(&"template_token"));
        assert!(found.contains(&"date_format"));
        assert!(found.contains(&"year_placeholder"));
    }

    #[test]
    fn detects_phone_numbers() {
        for text in ["Call (555) 123-4567", "Call 555-0199", "Call 123-456-7890", "Call 000-000-0000"] {
            assert!(patterns(text).contains(&"phone_number"), "missed phone in {:?}", text);
        }
        assert!(!patterns("Call 415-867-5309").contains(&"phone_number"));
    }

    #[test]
    fn different_rules_all_report() {
        let found = patterns("TBD: placeholder copy from example.com, dummy text");
        for expected in ["placeholder", "dummy", "tbd", "example_domain"] {
            assert!(found.contains(&expected), "missing {}", expected);
        }
    }

    #[test]
    fn repeated_text_keeps_first_occurrence() {
        let text = "first TBD here and then a much later tbd over there";
        let found = scan(text);
        let tbd: Vec<_> = found.iter().filter(|m| m.pattern == "tbd").collect();
        assert_eq!(tbd.len(), 1);
        assert_eq!(tbd[0].matched_text, "TBD");
        assert!(tbd[0].context.starts_with("first TBD"));
    }

    #[test]
    fn context_is_bounded_and_collapsed() {
        let text = format!("{}   lorem\n\n  {}", "a".repeat(200), "b".repeat(200));
        let found = scan(&text);
        assert_eq!(found.len(), 1);
        let context = &found[0].context;
        assert!(context.contains("a lorem b"));
        assert!(context.chars().count() <= 2 * CONTEXT_CHARS + "lorem".len());
    }

    #[test]
    fn context_handles_multibyte_text() {
        let found = scan("Café ☕ menu — placeholder — überall ✓");
        assert_eq!(found.len(), 1);
        assert!(found[0].context.contains("placeholder"));
    }

    #[test]
    fn scanning_is_idempotent() {
        let text = "Lorem ipsum at REPLACEME, call 555-0100 or mail test@example.com";
        assert_eq!(scan(text), scan(text));
    }

    #[test]
    fn markup_rules_match_attributes() {
        let html = r##"<a href="#">Learn more</a><img src="/img/image-placeholder.png">"##;
        let found: Vec<_> = scan_markup(html).into_iter().map(|m| m.pattern).collect();
        assert_eq!(found, vec!["image_placeholder", "bare_hash_href"]);
    }

    #[test]
    fn markup_scan_ignores_text_rules() {
        let html = r#"<input placeholder="Search"><p>Lorem ipsum</p><a href="/about">About</a>"#;
        assert!(scan_markup(html).is_empty());
        assert!(!patterns("Learn more").contains(&"bare_hash_href"));
    }

    #[test]
    fn scan_page_attributes_findings() {
        let findings = scan_page(
            "http://localhost:3000/about",
            "mobile",
            "Coming soon: TBD",
            r##"<p>Coming soon: TBD</p><a href='#'>More</a>"##,
        );
        let names: Vec<_> = findings.iter().map(|f| f.pattern.as_str()).collect();
        assert_eq!(names, vec!["tbd", "bare_hash_href"]);
        assert_eq!(findings[0].page, "http://localhost:3000/about");
        assert_eq!(findings[0].viewport, "mobile");
    }

    #[test]
    fn every_rule_compiles() {
        assert_eq!(
            COMPILED_RULES.len() + COMPILED_MARKUP_RULES.len(),
            rule_names().len()
        );
        assert_eq!(rule_names().last(), Some(&"bare_hash_href"));
    }
}
