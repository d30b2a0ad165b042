// src/fetch/staleness.rs
//! Decides whether a fetch brought new content. No hashing: the decision rests on the
//! transport's conditional-fetch answer and the validators it returned.

use super::{FetchResponse, Markers};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    Unchanged,
    Updated,
}

pub fn classify(prior: &Markers, response: &FetchResponse) -> Staleness {
    match response {
        FetchResponse::NotModified => Staleness::Unchanged,
        // First fetch (no markers) always counts as new content.
        FetchResponse::Content { .. } if prior.is_empty() => Staleness::Updated,
        FetchResponse::Content {
            etag,
            last_modified,
            ..
        } => {
            // Some servers ignore If-None-Match and answer 200 with the same validator.
            let same_etag = etag.is_some() && *etag == prior.etag;
            let same_modified =
                etag.is_none() && last_modified.is_some() && *last_modified == prior.modified;
            if same_etag || same_modified {
                Staleness::Unchanged
            } else {
                Staleness::Updated
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content(etag: Option<&str>, modified: Option<&str>) -> FetchResponse {
        FetchResponse::Content {
            body: b"<rss/>".to_vec(),
            etag: etag.map(str::to_string),
            last_modified: modified.map(str::to_string),
        }
    }

    #[test]
    fn first_fetch_is_always_updated() {
        let none = Markers::default();
        assert_eq!(classify(&none, &content(None, None)), Staleness::Updated);
        assert_eq!(classify(&none, &content(Some("\"a\""), None)), Staleness::Updated);
    }

    #[test]
    fn not_modified_is_unchanged() {
        let prior = Markers::new(None, Some("\"a\"".into()));
        assert_eq!(classify(&prior, &FetchResponse::NotModified), Staleness::Unchanged);
    }

    #[test]
    fn repeated_validators_count_as_unchanged() {
        let prior = Markers::new(
            Some("Tue, 10 Jun 2025 04:00:00 GMT".into()),
            Some("\"a\"".into()),
        );
        assert_eq!(classify(&prior, &content(Some("\"a\""), None)), Staleness::Unchanged);
        assert_eq!(classify(&prior, &content(Some("\"b\""), None)), Staleness::Updated);

        let by_date = Markers::new(Some("Tue, 10 Jun 2025 04:00:00 GMT".into()), None);
        assert_eq!(
            classify(&by_date, &content(None, Some("Tue, 10 Jun 2025 04:00:00 GMT"))),
            Staleness::Unchanged
        );
        assert_eq!(classify(&by_date, &content(None, None)), Staleness::Updated);
    }

    #[test]
    fn blank_markers_are_ignored() {
        assert!(Markers::new(Some(String::new()), Some(String::new())).is_empty());
    }
}
