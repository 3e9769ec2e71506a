//! Bounded previews of inbound payloads for request logging.

/// Payloads longer than this are truncated in log lines.
pub(crate) const PREVIEW_LIMIT: usize = 2048;

const ELLIPSIS: &str = "...";

/// Renders `payload` for logging, keeping the first 2045 bytes and appending
/// `...` when it exceeds [`PREVIEW_LIMIT`].
pub(crate) fn preview(payload: &[u8]) -> String {
    if payload.len() <= PREVIEW_LIMIT {
        return String::from_utf8_lossy(payload).into_owned();
    }
    let kept = payload
        .get(..PREVIEW_LIMIT - ELLIPSIS.len())
        .unwrap_or(payload);
    let mut text = String::from_utf8_lossy(kept).into_owned();
    text.push_str(ELLIPSIS);
    text
}
