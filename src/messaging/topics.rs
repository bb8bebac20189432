//! Notification topic naming.

const INGEST_SUFFIX: &str = ".in";
const NOTIFICATION_SUFFIX: &str = ".notification";

/// Derive the notification topic from a batch's ingest topic.
///
/// A trailing `.in` is replaced by `.notification`; any other topic gets
/// `.notification` appended.
pub fn notification_topic(ingest_topic: &str) -> String {
    let base = ingest_topic
        .strip_suffix(INGEST_SUFFIX)
        .unwrap_or(ingest_topic);
    format!("{base}{NOTIFICATION_SUFFIX}")
}
