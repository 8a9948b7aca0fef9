// src/ingest/mod.rs
pub mod accounts;
pub mod dedup;
pub mod producer;
pub mod providers;
pub mod types;

use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;

pub use dedup::SeenSet;
pub use producer::{PassStats, Producer, ProducerCfg};

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_fetched_total", "Messages returned by the source connector.");
        describe_counter!(
            "ingest_published_total",
            "New messages published to the bus."
        );
        describe_counter!(
            "ingest_duplicates_total",
            "Messages dropped because their id was already seen."
        );
        describe_counter!(
            "ingest_fetch_errors_total",
            "Per-account fetch errors and timeouts."
        );
        describe_counter!(
            "ingest_publish_errors_total",
            "Bus publish failures (message lost for this pass)."
        );
        describe_histogram!("ingest_parse_ms", "Feed parse time in milliseconds.");
        describe_gauge!("ingest_seen_size", "Ids currently held by the dedup set.");
        describe_gauge!("ingest_last_pass_ts", "Unix ts when the last poll pass ended.");
    });
}

/// Normalize post text: decode entities, strip tags, fold quotes and whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS
        .get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").expect("static regex"));
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize curly quotes to ASCII
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace (incl. NBSP)
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS
        .get_or_init(|| regex::Regex::new(r"[\s\u{00A0}]+").expect("static regex"));
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 5) Length cap: 2000 chars
    if out.chars().count() > 2000 {
        out = out.chars().take(2000).collect();
    }

    out
}

/// Char-safe shortening for log lines.
pub fn truncate(s: &str, n: usize) -> String {
    if s.chars().count() <= n {
        return s.to_string();
    }
    let mut out: String = s.chars().take(n).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_collapses_ws_and_entities() {
        let s = "  GM&nbsp;&nbsp; frens   <b>$FOO</b> ";
        assert_eq!(normalize_text(s), "GM frens $FOO");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("🚀🚀🚀🚀", 2), "🚀🚀...");
    }
}
