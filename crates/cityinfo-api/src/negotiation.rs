//! # Content Negotiation
//!
//! Picks the response representation from the `Accept` header and renders
//! bodies in it. JSON and XML are registered; an Accept header that matches
//! neither yields 406 instead of a silent fallback.
//!
//! Selection walks the media ranges by descending quality (ties keep header
//! order). `*/*` and an absent header pick the default format.

use axum::body::Body;
use axum::http::request::Parts;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use mime::Mime;
use serde::de::DeserializeOwned;
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::error::AppError;

/// Negotiation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NegotiationError {
    /// No registered format satisfies the Accept header.
    #[error("no registered representation satisfies '{requested}'")]
    NotAcceptable {
        /// The Accept header as received.
        requested: String,
        /// Media types the server can produce.
        supported: Vec<String>,
    },

    /// A request body declares a media type no format reads.
    #[error("cannot read request bodies of type '{0}'")]
    UnsupportedMediaType(String),

    /// A request body could not be parsed in its declared format.
    #[error("malformed request body: {0}")]
    Malformed(String),

    /// A response body could not be written.
    #[error("failed to serialize {format} response: {reason}")]
    Serialize {
        /// Format name.
        format: &'static str,
        /// Serializer message.
        reason: String,
    },

    /// The default format is not among the registered formats.
    #[error("default format {0} is not registered")]
    DefaultNotRegistered(&'static str),

    /// No formats registered.
    #[error("no output formats registered")]
    Empty,
}

/// A representation format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaFormat {
    /// `application/json`, `text/json`, `application/*+json`.
    Json,
    /// `application/xml`, `text/xml`, `application/*+xml`.
    Xml,
}

impl MediaFormat {
    /// Short name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Xml => "xml",
        }
    }

    /// Canonical media type.
    pub fn media_type(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Xml => "application/xml",
        }
    }

    /// Content-Type of responses in this format.
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Json => "application/json; charset=utf-8",
            Self::Xml => "application/xml; charset=utf-8",
        }
    }

    /// Media types this format reads and writes.
    pub fn supported_media_types(self) -> &'static [&'static str] {
        match self {
            Self::Json => &["application/json", "text/json", "application/*+json"],
            Self::Xml => &["application/xml", "text/xml", "application/*+xml"],
        }
    }

    fn suffix(self) -> &'static str {
        self.name()
    }

    /// Whether a concrete media type (no wildcards) belongs to this format.
    pub fn matches(self, media: &Mime) -> bool {
        let ty = media.type_();
        let subtype = media.subtype().as_str();
        let plain = subtype == self.suffix();
        let suffixed = media.suffix().map(|s| s.as_str()) == Some(self.suffix());
        (ty == mime::APPLICATION && (plain || suffixed)) || (ty == mime::TEXT && plain)
    }

    /// Serialize a single value. `root` names the XML document element.
    pub fn to_bytes<T: Serialize>(self, root: &str, value: &T) -> Result<Vec<u8>, NegotiationError> {
        let fail = |reason: String| NegotiationError::Serialize {
            format: self.name(),
            reason,
        };
        match self {
            Self::Json => serde_json::to_vec(value).map_err(|e| fail(e.to_string())),
            Self::Xml => quick_xml::se::to_string_with_root(root, value)
                .map(String::into_bytes)
                .map_err(|e| fail(e.to_string())),
        }
    }

    /// Parse a request body.
    pub fn from_bytes<T: DeserializeOwned>(self, bytes: &[u8]) -> Result<T, NegotiationError> {
        match self {
            Self::Json => {
                serde_json::from_slice(bytes).map_err(|e| NegotiationError::Malformed(e.to_string()))
            }
            Self::Xml => {
                let text = std::str::from_utf8(bytes)
                    .map_err(|e| NegotiationError::Malformed(e.to_string()))?;
                quick_xml::de::from_str(text).map_err(|e| NegotiationError::Malformed(e.to_string()))
            }
        }
    }
}

/// One entry of an Accept header.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaRange {
    /// The range, possibly with wildcards.
    pub mime: Mime,
    /// Quality in `0.0..=1.0`.
    pub quality: f32,
}

/// Parse an Accept header, most preferred first. Unparseable entries are skipped.
pub fn parse_accept(header: &str) -> Vec<MediaRange> {
    let mut ranges: Vec<MediaRange> = header
        .split(',')
        .filter_map(|entry| entry.trim().parse::<Mime>().ok())
        .map(|mime| {
            let quality = mime
                .get_param("q")
                .and_then(|q| q.as_str().parse::<f32>().ok())
                .map(|q| q.clamp(0.0, 1.0))
                .unwrap_or(1.0);
            MediaRange { mime, quality }
        })
        .collect();
    // Stable: equal qualities keep header order.
    ranges.sort_by(|a, b| b.quality.total_cmp(&a.quality));
    ranges
}

/// A representation that can be rendered in any registered format.
pub trait Representation: Serialize {
    /// XML element name of a single item.
    const XML_NAME: &'static str;
    /// XML element name of a collection of items.
    const XML_COLLECTION_NAME: &'static str;
}

/// Serializes a slice as `<Collection><Item/>...</Collection>` in XML and as
/// a bare array in JSON.
struct XmlCollection<'a, T> {
    items: &'a [T],
}

impl<T: Representation> Serialize for XmlCollection<'_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct(T::XML_COLLECTION_NAME, 1)?;
        state.serialize_field(T::XML_NAME, self.items)?;
        state.end()
    }
}

/// The registered formats and the default.
#[derive(Debug, Clone)]
pub struct ContentNegotiator {
    formats: Vec<MediaFormat>,
    default: MediaFormat,
}

impl ContentNegotiator {
    /// Build a negotiator. `default` must be among `formats`.
    pub fn new(formats: Vec<MediaFormat>, default: MediaFormat) -> Result<Self, NegotiationError> {
        if formats.is_empty() {
            return Err(NegotiationError::Empty);
        }
        if !formats.contains(&default) {
            return Err(NegotiationError::DefaultNotRegistered(default.name()));
        }
        Ok(Self { formats, default })
    }

    /// JSON (default) and XML.
    pub fn json_and_xml() -> Self {
        Self {
            formats: vec![MediaFormat::Json, MediaFormat::Xml],
            default: MediaFormat::Json,
        }
    }

    /// The default format.
    pub fn default_format(&self) -> MediaFormat {
        self.default
    }

    /// Every media type the registered formats produce.
    pub fn supported_media_types(&self) -> Vec<String> {
        self.formats
            .iter()
            .flat_map(|f| f.supported_media_types().iter().map(|m| m.to_string()))
            .collect()
    }

    /// Choose the response format for an Accept header.
    pub fn select(&self, accept: &Accept) -> Result<MediaFormat, NegotiationError> {
        if accept.ranges.is_empty() {
            return Ok(self.default);
        }
        // Formats the caller refused outright with a concrete `q=0` range.
        let excluded: Vec<MediaFormat> = self
            .formats
            .iter()
            .copied()
            .filter(|f| {
                accept.ranges.iter().any(|r| {
                    r.quality <= 0.0
                        && r.mime.type_() != mime::STAR
                        && r.mime.subtype() != mime::STAR
                        && f.matches(&r.mime)
                })
            })
            .collect();
        let acceptable = |f: &MediaFormat| !excluded.contains(f);

        for range in accept.ranges.iter().filter(|r| r.quality > 0.0) {
            let mime = &range.mime;
            let candidates: Vec<MediaFormat> = if mime.type_() == mime::STAR {
                self.formats.iter().copied().filter(acceptable).collect()
            } else if mime.subtype() == mime::STAR {
                self.formats
                    .iter()
                    .copied()
                    .filter(acceptable)
                    .filter(|f| {
                        f.supported_media_types()
                            .iter()
                            .any(|m| m.split('/').next() == Some(mime.type_().as_str()))
                    })
                    .collect()
            } else {
                if let Some(format) = self
                    .formats
                    .iter()
                    .copied()
                    .filter(acceptable)
                    .find(|f| f.matches(mime))
                {
                    return Ok(format);
                }
                continue;
            };
            if candidates.contains(&self.default) {
                return Ok(self.default);
            }
            if let Some(format) = candidates.first() {
                return Ok(*format);
            }
        }
        Err(NegotiationError::NotAcceptable {
            requested: accept.raw.clone(),
            supported: self.supported_media_types(),
        })
    }

    /// Format of a request body, from its Content-Type.
    pub fn input_format(&self, content_type: Option<&str>) -> Result<MediaFormat, NegotiationError> {
        let raw = content_type.unwrap_or_default();
        let mime = raw
            .parse::<Mime>()
            .map_err(|_| NegotiationError::UnsupportedMediaType(raw.to_string()))?;
        self.formats
            .iter()
            .copied()
            .find(|f| f.matches(&mime))
            .ok_or_else(|| NegotiationError::UnsupportedMediaType(raw.to_string()))
    }

    /// Render one value in the negotiated format.
    pub fn respond<T: Representation>(
        &self,
        accept: &Accept,
        status: StatusCode,
        value: &T,
    ) -> Result<Response, AppError> {
        let format = self.select(accept)?;
        let body = format.to_bytes(T::XML_NAME, value)?;
        Ok(build_response(status, format, body))
    }

    /// Render a collection in the negotiated format.
    pub fn respond_many<T: Representation>(
        &self,
        accept: &Accept,
        status: StatusCode,
        items: &[T],
    ) -> Result<Response, AppError> {
        let format = self.select(accept)?;
        let body = match format {
            MediaFormat::Json => format.to_bytes(T::XML_COLLECTION_NAME, &items)?,
            MediaFormat::Xml => {
                format.to_bytes(T::XML_COLLECTION_NAME, &XmlCollection { items })?
            }
        };
        Ok(build_response(status, format, body))
    }
}

fn build_response(status: StatusCode, format: MediaFormat, body: Vec<u8>) -> Response {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(format.content_type()),
    );
    response
}

/// The request's parsed Accept header.
#[derive(Debug, Clone, Default)]
pub struct Accept {
    raw: String,
    ranges: Vec<MediaRange>,
}

impl Accept {
    /// Parse a header value.
    pub fn parse(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
            ranges: parse_accept(raw),
        }
    }

    /// Ranges, most preferred first.
    pub fn ranges(&self) -> &[MediaRange] {
        &self.ranges
    }
}

#[axum::async_trait]
impl<S: Send + Sync> axum::extract::FromRequestParts<S> for Accept {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let joined = parts
            .headers
            .get_all(header::ACCEPT)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect::<Vec<_>>()
            .join(",");
        Ok(Self::parse(&joined))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    #[serde(rename_all = "camelCase")]
    struct Sample {
        id: i32,
        name: String,
    }

    impl Representation for Sample {
        const XML_NAME: &'static str = "Sample";
        const XML_COLLECTION_NAME: &'static str = "Samples";
    }

    fn negotiator() -> ContentNegotiator {
        ContentNegotiator::json_and_xml()
    }

    #[test]
    fn quality_orders_ranges() {
        let ranges = parse_accept("text/html;q=0.5, application/xml, */*;q=0.1");
        assert_eq!(ranges[0].mime.essence_str(), "application/xml");
        assert_eq!(ranges[1].mime.essence_str(), "text/html");
        assert_eq!(ranges[2].mime.essence_str(), "*/*");
    }

    #[test]
    fn absent_header_uses_default() {
        assert_eq!(negotiator().select(&Accept::default()), Ok(MediaFormat::Json));
    }

    #[test]
    fn explicit_xml_wins() {
        let accept = Accept::parse("application/xml");
        assert_eq!(negotiator().select(&accept), Ok(MediaFormat::Xml));
        let accept = Accept::parse("text/xml");
        assert_eq!(negotiator().select(&accept), Ok(MediaFormat::Xml));
    }

    #[test]
    fn preference_order_is_respected() {
        let accept = Accept::parse("application/json;q=0.4, application/xml;q=0.9");
        assert_eq!(negotiator().select(&accept), Ok(MediaFormat::Xml));
    }

    #[test]
    fn structured_suffix_matches() {
        let accept = Accept::parse("application/problem+json");
        assert_eq!(negotiator().select(&accept), Ok(MediaFormat::Json));
    }

    #[test]
    fn wildcards_pick_default() {
        assert_eq!(negotiator().select(&Accept::parse("*/*")), Ok(MediaFormat::Json));
        assert_eq!(negotiator().select(&Accept::parse("application/*")), Ok(MediaFormat::Json));
        assert_eq!(negotiator().select(&Accept::parse("text/*")), Ok(MediaFormat::Json));
    }

    #[test]
    fn wildcards_skip_refused_formats() {
        let n = negotiator();
        assert_eq!(n.select(&Accept::parse("application/json;q=0, */*")), Ok(MediaFormat::Xml));
        assert_eq!(
            n.select(&Accept::parse("application/*, application/json;q=0")),
            Ok(MediaFormat::Xml)
        );
        assert_eq!(n.select(&Accept::parse("application/xml;q=0, */*")), Ok(MediaFormat::Json));
        let err = n
            .select(&Accept::parse("application/json;q=0, application/xml;q=0, */*"))
            .unwrap_err();
        assert!(matches!(err, NegotiationError::NotAcceptable { .. }));
    }

    #[test]
    fn unmatched_type_is_not_acceptable() {
        let err = negotiator().select(&Accept::parse("text/csv")).unwrap_err();
        assert!(matches!(err, NegotiationError::NotAcceptable { requested, .. } if requested == "text/csv"));
    }

    #[test]
    fn zero_quality_excludes() {
        let err = negotiator().select(&Accept::parse("application/json;q=0")).unwrap_err();
        assert!(matches!(err, NegotiationError::NotAcceptable { .. }));
    }

    #[test]
    fn default_must_be_registered() {
        let err = ContentNegotiator::new(vec![MediaFormat::Json], MediaFormat::Xml).unwrap_err();
        assert_eq!(err, NegotiationError::DefaultNotRegistered("xml"));
    }

    #[test]
    fn xml_uses_root_element() {
        let xml = MediaFormat::Xml
            .to_bytes("Sample", &Sample { id: 1, name: "Antwerp".into() })
            .unwrap();
        let xml = String::from_utf8(xml).unwrap();
        assert!(xml.starts_with("<Sample>"), "{xml}");
        assert!(xml.contains("<name>Antwerp</name>"));
    }

    #[test]
    fn xml_collection_wraps_items() {
        let items = [
            Sample { id: 1, name: "a".into() },
            Sample { id: 2, name: "b".into() },
        ];
        let body = MediaFormat::Xml
            .to_bytes("Samples", &XmlCollection { items: &items })
            .unwrap();
        let xml = String::from_utf8(body).unwrap();
        assert!(xml.starts_with("<Samples>"), "{xml}");
        assert_eq!(xml.matches("<Sample>").count(), 2);
    }

    #[test]
    fn input_format_from_content_type() {
        let n = negotiator();
        assert_eq!(n.input_format(Some("application/json; charset=utf-8")), Ok(MediaFormat::Json));
        assert_eq!(n.input_format(Some("application/xml")), Ok(MediaFormat::Xml));
        assert!(matches!(
            n.input_format(Some("text/plain")),
            Err(NegotiationError::UnsupportedMediaType(_))
        ));
        assert!(matches!(n.input_format(None), Err(NegotiationError::UnsupportedMediaType(_))));
    }

    #[test]
    fn xml_body_parses() {
        let parsed: Sample = MediaFormat::Xml
            .from_bytes(b"<Sample><id>4</id><name>Ghent</name></Sample>")
            .unwrap();
        assert_eq!(parsed, Sample { id: 4, name: "Ghent".into() });
    }
}
