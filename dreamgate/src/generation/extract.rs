//! Asset URL extraction from completed history records.

use super::GenerateError;
use crate::upstream::HistoryRecord;

/// Extracts asset URLs from a completed record's item list.
///
/// Items without a usable URL are skipped; a record whose items yield no
/// URLs at all is an extraction failure, as is an empty item list on a
/// record the poller considered complete.
pub fn extract_urls(record: &HistoryRecord) -> Result<Vec<String>, GenerateError> {
    if record.item_list.is_empty() {
        return Err(GenerateError::ResultExtraction(
            "completed record carries an empty item_list".to_string(),
        ));
    }

    let urls: Vec<String> = record
        .item_list
        .iter()
        .filter_map(|item| item.asset_url())
        .collect();

    if urls.is_empty() {
        return Err(GenerateError::ResultExtraction(format!(
            "no URLs extractable from {} items",
            record.item_list.len()
        )));
    }
    Ok(urls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(items: serde_json::Value) -> HistoryRecord {
        serde_json::from_value(json!({
            "status": 50,
            "fail_code": 0,
            "item_list": items,
        }))
        .unwrap()
    }

    #[test]
    fn test_extracts_image_urls() {
        let record = record(json!([
            {"image": {"large_images": [{"image_url": "https://cdn/a.webp"}]}},
            {"image": {"large_images": [{"image_url": "https://cdn/b.webp"}]}},
        ]));
        let urls = extract_urls(&record).unwrap();
        assert_eq!(urls, vec!["https://cdn/a.webp", "https://cdn/b.webp"]);
    }

    #[test]
    fn test_skips_items_without_urls() {
        let record = record(json!([
            {},
            {"common_attr": {"cover_url": "https://cdn/cover.webp"}},
        ]));
        let urls = extract_urls(&record).unwrap();
        assert_eq!(urls, vec!["https://cdn/cover.webp"]);
    }

    #[test]
    fn test_empty_item_list_is_error() {
        let record = record(json!([]));
        assert!(matches!(
            extract_urls(&record),
            Err(GenerateError::ResultExtraction(_))
        ));
    }

    #[test]
    fn test_items_without_any_urls_is_error() {
        let record = record(json!([{}, {}]));
        let err = extract_urls(&record).unwrap_err();
        match err {
            GenerateError::ResultExtraction(msg) => assert!(msg.contains("2 items")),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
