use super::{MatchOrder, OrderToStopMapping, PageMatch};
use tracing::debug;

/// Stop number printed on pages no order reference could be found for.
pub const UNMATCHED: &str = "?";

/// Find the order reference on one label page.
///
/// Keys are tried in `order`. For each key the page text is checked for the
/// key itself, then for the key without its leading '#', then for the key
/// with a '#' prepended. The first key that hits wins. Empty keys never match.
pub fn match_page(
    page_index: usize,
    page_text: &str,
    mapping: &OrderToStopMapping,
    order: MatchOrder,
) -> PageMatch {
    let hit = mapping
        .ordered(order)
        .into_iter()
        .find(|(key, _)| key_on_page(key, page_text));

    match hit {
        Some((key, stop)) => {
            debug!(page = page_index + 1, order = %key, stop = %stop, "Matched label");
            PageMatch {
                page_index,
                order_ref: Some(key.to_string()),
                stop_number: stop.to_string(),
                matched: true,
            }
        }
        None => {
            debug!(page = page_index + 1, "No order reference found on label");
            PageMatch {
                page_index,
                order_ref: None,
                stop_number: UNMATCHED.to_string(),
                matched: false,
            }
        }
    }
}

/// Match every page of a document, in page order.
pub fn match_pages<S: AsRef<str>>(
    page_texts: &[S],
    mapping: &OrderToStopMapping,
    order: MatchOrder,
) -> Vec<PageMatch> {
    page_texts
        .iter()
        .enumerate()
        .map(|(idx, text)| match_page(idx, text.as_ref(), mapping, order))
        .collect()
}

fn key_on_page(key: &str, text: &str) -> bool {
    if key.is_empty() {
        return false;
    }
    if text.contains(key) {
        return true;
    }
    match key.strip_prefix('#') {
        Some(bare) => !bare.is_empty() && text.contains(bare),
        None => text.contains(&format!("#{key}")),
    }
}
