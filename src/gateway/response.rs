//! Response Builder
//!
//! Turns the outcome of a gateway request into the HTTP response: status,
//! headers and body for every row of the routing table.

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use tracing::debug;

use super::listing::DirectorySnapshot;
use super::range::{unsatisfied_content_range, ByteRange};
use crate::assets::Asset;
use crate::error::Error;
use crate::store::{HttpMetadata, StoredObject};

/// Completed gateway request, ready to be rendered
#[derive(Debug)]
pub enum Outcome {
    /// Directory browser page (HTML view)
    DirectoryPage(Asset),
    /// Directory snapshot (JSON view)
    DirectoryListing(DirectorySnapshot),
    /// File body; `range` is set for partial content
    File {
        object: StoredObject,
        range: Option<ByteRange>,
    },
    /// Terminal failure
    Failed(Error),
}

/// Rendering switches taken from configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseOptions {
    /// Add `Access-Control-Allow-Origin: *` to JSON listings
    pub cors: bool,
}

/// Render an outcome
pub fn build(outcome: Outcome, options: ResponseOptions) -> Response {
    match outcome {
        Outcome::DirectoryPage(asset) => directory_page(asset),
        Outcome::DirectoryListing(snapshot) => directory_listing(&snapshot, options),
        Outcome::File { object, range } => file(object, range),
        Outcome::Failed(error) => error_response(&error),
    }
}

fn directory_page(asset: Asset) -> Response {
    let mut headers = HeaderMap::new();
    insert(&mut headers, header::CONTENT_TYPE, &asset.content_type);
    (StatusCode::OK, headers, Body::from(asset.body)).into_response()
}

fn directory_listing(snapshot: &DirectorySnapshot, options: ResponseOptions) -> Response {
    let body = match serde_json::to_vec(snapshot) {
        Ok(b) => b,
        Err(e) => {
            return error_response(&Error::Upstream(format!("failed to encode listing: {}", e)));
        }
    };

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if options.cors {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    }
    (StatusCode::OK, headers, body).into_response()
}

fn file(object: StoredObject, range: Option<ByteRange>) -> Response {
    let StoredObject { meta, body, .. } = object;

    let mut headers = HeaderMap::new();
    write_http_metadata(&mut headers, &meta.http_metadata);
    insert(&mut headers, header::ETAG, &meta.http_etag());
    insert(&mut headers, header::LAST_MODIFIED, &http_date(&meta.uploaded));
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));

    let status = match range {
        Some(range) => {
            insert(&mut headers, header::CONTENT_RANGE, &range.content_range());
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(range.len()));
            StatusCode::PARTIAL_CONTENT
        }
        None => {
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(meta.size));
            StatusCode::OK
        }
    };

    (status, headers, Body::from_stream(body)).into_response()
}

/// Render a terminal error as a plain-text response
pub fn error_response(error: &Error) -> Response {
    let status = error.status_code();
    let mut headers = HeaderMap::new();

    match error {
        Error::RangeUnsatisfiable { size } => {
            insert(&mut headers, header::CONTENT_RANGE, &unsatisfied_content_range(*size));
            return (status, headers, Body::empty()).into_response();
        }
        Error::MethodNotAllowed(_) => {
            headers.insert(header::ALLOW, HeaderValue::from_static("GET"));
        }
        _ => {}
    }

    let reason = status.canonical_reason().unwrap_or("Error");
    (status, headers, reason.to_string()).into_response()
}

/// Copy stored HTTP metadata onto response headers
fn write_http_metadata(headers: &mut HeaderMap, metadata: &HttpMetadata) {
    let fields = [
        (header::CONTENT_TYPE, metadata.content_type.as_deref()),
        (header::CONTENT_LANGUAGE, metadata.content_language.as_deref()),
        (header::CONTENT_DISPOSITION, metadata.content_disposition.as_deref()),
        (header::CONTENT_ENCODING, metadata.content_encoding.as_deref()),
        (header::CACHE_CONTROL, metadata.cache_control.as_deref()),
    ];
    for (name, value) in fields {
        if let Some(value) = value {
            insert(headers, name, value);
        }
    }
    if let Some(expires) = &metadata.expires {
        insert(headers, header::EXPIRES, &http_date(expires));
    }
}

fn insert(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(v) => {
            headers.insert(name, v);
        }
        Err(_) => debug!("Dropping invalid {} header value {:?}", name, value),
    }
}

/// IMF-fixdate, as used by Last-Modified and Expires
pub fn http_date(time: &DateTime<Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::listing::{DirectoryEntry, DirectoryItem};
    use crate::store::{ByteSpan, ObjectMeta};
    use bytes::Bytes;
    use chrono::TimeZone;

    fn stored(data: &'static [u8], span: Option<ByteSpan>) -> StoredObject {
        let slice = match span {
            Some(s) => &data[s.start as usize..=s.end as usize],
            None => data,
        };
        StoredObject {
            meta: ObjectMeta {
                key: "docs/a.txt".into(),
                size: data.len() as u64,
                etag: "abc".into(),
                uploaded: Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap(),
                http_metadata: HttpMetadata {
                    content_type: Some("text/plain".into()),
                    cache_control: Some("no-cache".into()),
                    content_disposition: Some("bad\nvalue".into()),
                    ..Default::default()
                },
            },
            span,
            body: Box::pin(futures::stream::once(async move { Ok(Bytes::from_static(slice)) })),
        }
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()
    }

    #[tokio::test]
    async fn test_full_file() {
        let response = build(
            Outcome::File { object: stored(b"0123456789", None), range: None },
            ResponseOptions::default(),
        );

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_LENGTH], "10");
        assert_eq!(headers[header::ACCEPT_RANGES], "bytes");
        assert_eq!(headers[header::ETAG], "\"abc\"");
        assert_eq!(headers[header::CONTENT_TYPE], "text/plain");
        assert_eq!(headers[header::CACHE_CONTROL], "no-cache");
        assert_eq!(headers[header::LAST_MODIFIED], "Fri, 01 Mar 2024 12:30:00 GMT");
        assert!(headers.get(header::CONTENT_DISPOSITION).is_none());
        assert!(headers.get(header::CONTENT_RANGE).is_none());
        assert_eq!(body_bytes(response).await, b"0123456789");
    }

    #[tokio::test]
    async fn test_partial_file() {
        let range = ByteRange { start: 2, end: 4, total: 10 };
        let response = build(
            Outcome::File { object: stored(b"0123456789", Some(range.span())), range: Some(range) },
            ResponseOptions::default(),
        );

        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 2-4/10");
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "3");
        assert_eq!(body_bytes(response).await, b"234");
    }

    #[tokio::test]
    async fn test_error_responses() {
        let response = error_response(&Error::RangeUnsatisfiable { size: 100 });
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes */100");
        assert!(body_bytes(response).await.is_empty());

        let response = error_response(&Error::MethodNotAllowed("POST".into()));
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[header::ALLOW], "GET");

        let response = error_response(&Error::RateLimited("list".into()));
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body_bytes(response).await, b"Too Many Requests");

        let response = build(Outcome::Failed(Error::NotFound("/x".into())), ResponseOptions::default());
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_bytes(response).await, b"Not Found");
    }

    #[tokio::test]
    async fn test_directory_views() {
        let snapshot = DirectorySnapshot {
            path: "/".into(),
            items: vec![DirectoryItem::Directory(DirectoryEntry::from("docs/".to_string()))],
            parent: None,
        };

        let response = build(Outcome::DirectoryListing(snapshot.clone()), ResponseOptions { cors: true });
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        let json: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(json["items"][0]["name"], "docs");

        let response = build(Outcome::DirectoryListing(snapshot), ResponseOptions { cors: false });
        assert!(response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());

        let page = Asset { body: Bytes::from_static(b"<html></html>"), content_type: "text/html".into() };
        let response = build(Outcome::DirectoryPage(page), ResponseOptions::default());
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/html");
        assert_eq!(body_bytes(response).await, b"<html></html>");

        let page = Asset {
            body: Bytes::from_static(b"<p>x</p>"),
            content_type: "application/xhtml+xml".into(),
        };
        let response = build(Outcome::DirectoryPage(page), ResponseOptions::default());
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/xhtml+xml");
    }
}
