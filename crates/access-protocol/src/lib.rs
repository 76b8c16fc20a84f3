#![forbid(unsafe_code)]

mod events;

use std::fmt;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

pub use events::{
    notification_event_manifest, parse_notification_event_manifest, NotificationAudience,
    NotificationEventManifest, NotificationEventManifestEntry, NotificationEventManifestError,
};

/// Current notification envelope version.
pub const PROTOCOL_VERSION: u16 = 1;
/// Upper bound on an encoded notification, in bytes.
pub const MAX_EVENT_BYTES: usize = 64 * 1024;

pub const EVENT_ACCESS_REQUEST_CREATED: &str = "access_request.created";
pub const EVENT_ACCESS_REQUEST_APPROVED: &str = "access_request.approved";
pub const EVENT_ACCESS_REQUEST_REJECTED: &str = "access_request.rejected";

/// Closed set of lifecycle notifications a dispatcher may receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum NotificationKind {
    RequestCreated,
    RequestApproved,
    RequestRejected,
}

impl NotificationKind {
    pub const ALL: [Self; 3] = [
        Self::RequestCreated,
        Self::RequestApproved,
        Self::RequestRejected,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RequestCreated => EVENT_ACCESS_REQUEST_CREATED,
            Self::RequestApproved => EVENT_ACCESS_REQUEST_APPROVED,
            Self::RequestRejected => EVENT_ACCESS_REQUEST_REJECTED,
        }
    }

    /// Who this event goes to, per the embedded manifest.
    #[must_use]
    pub fn audience(self) -> Option<NotificationAudience> {
        notification_event_manifest().audience(self)
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for NotificationKind {
    type Error = ProtocolError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        validate_event_type(value)?;
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value)
            .ok_or_else(|| ProtocolError::UnknownEventType(value.to_owned()))
    }
}

impl TryFrom<String> for NotificationKind {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl From<NotificationKind> for &'static str {
    fn from(value: NotificationKind) -> Self {
        value.as_str()
    }
}

/// Versioned notification envelope: `{ v, t, d }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Envelope<T> {
    pub v: u16,
    pub t: NotificationKind,
    pub d: T,
}

/// Wrap `data` for delivery.
///
/// # Errors
/// [`ProtocolError::UnknownEventType`] for events outside [`NotificationKind`],
/// [`ProtocolError::InvalidJson`] if `data` fails to serialize,
/// [`ProtocolError::OversizedPayload`] past [`MAX_EVENT_BYTES`].
pub fn encode_envelope<T: Serialize>(event_type: &str, data: &T) -> Result<String, ProtocolError> {
    let kind = NotificationKind::try_from(event_type)?;

    let encoded = serde_json::to_string(&Envelope {
        v: PROTOCOL_VERSION,
        t: kind,
        d: data,
    })?;
    check_size(encoded.len())?;
    Ok(encoded)
}

/// Parse an envelope, leaving the payload untyped.
///
/// # Errors
/// Oversized input, malformed JSON, unknown fields, an unknown event type or a
/// version other than [`PROTOCOL_VERSION`].
pub fn parse_envelope(input: &[u8]) -> Result<Envelope<serde_json::Value>, ProtocolError> {
    decode_envelope(input)
}

/// Parse an envelope and deserialize its payload as `T`.
///
/// # Errors
/// As [`parse_envelope`], plus payloads that do not match `T`.
pub fn decode_envelope<T: DeserializeOwned>(input: &[u8]) -> Result<Envelope<T>, ProtocolError> {
    check_size(input.len())?;
    let envelope: Envelope<T> = serde_json::from_slice(input)?;
    if envelope.v != PROTOCOL_VERSION {
        return Err(ProtocolError::UnsupportedVersion {
            expected: PROTOCOL_VERSION,
            actual: envelope.v,
        });
    }
    Ok(envelope)
}

fn check_size(actual: usize) -> Result<(), ProtocolError> {
    if actual > MAX_EVENT_BYTES {
        return Err(ProtocolError::OversizedPayload {
            max: MAX_EVENT_BYTES,
            actual,
        });
    }
    Ok(())
}

/// Event identifiers are dot-separated segments of `[a-z0-9_]`, e.g. `access_request.created`.
pub(crate) fn validate_event_type(value: &str) -> Result<(), ProtocolError> {
    const MAX_LEN: usize = 64;

    let well_formed = value.len() <= MAX_LEN
        && value.contains('.')
        && value.split('.').all(|segment| {
            !segment.is_empty()
                && segment
                    .bytes()
                    .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
        });
    if well_formed {
        Ok(())
    } else {
        Err(ProtocolError::InvalidEventType)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("payload exceeds max size: max={max} bytes actual={actual} bytes")]
    OversizedPayload { max: usize, actual: usize },
    #[error("unsupported envelope version: expected={expected} actual={actual}")]
    UnsupportedVersion { expected: u16, actual: u16 },
    #[error("malformed event type")]
    InvalidEventType,
    #[error("unknown event type `{0}`")]
    UnknownEventType(String),
    #[error("invalid json payload: {0}")]
    InvalidJson(String),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(error: serde_json::Error) -> Self {
        Self::InvalidJson(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::{
        decode_envelope, encode_envelope, parse_envelope, NotificationKind, ProtocolError,
        EVENT_ACCESS_REQUEST_CREATED, MAX_EVENT_BYTES, PROTOCOL_VERSION,
    };

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Payload {
        request_id: String,
    }

    #[test]
    fn kinds_parse_from_their_wire_names() {
        for kind in NotificationKind::ALL {
            assert_eq!(NotificationKind::try_from(kind.as_str()), Ok(kind));
        }
        assert_eq!(
            NotificationKind::try_from("access_request.expired"),
            Err(ProtocolError::UnknownEventType(String::from(
                "access_request.expired"
            )))
        );
        assert_eq!(
            NotificationKind::try_from("access-request.created"),
            Err(ProtocolError::InvalidEventType)
        );
        assert_eq!(
            NotificationKind::try_from("access_request."),
            Err(ProtocolError::InvalidEventType)
        );
    }

    #[test]
    fn encoded_envelope_decodes_into_typed_payload() {
        let payload = Payload {
            request_id: String::from("01J0000000000000000000000A"),
        };
        let encoded = encode_envelope(EVENT_ACCESS_REQUEST_CREATED, &payload).unwrap();
        assert!(encoded.starts_with(r#"{"v":1,"t":"access_request.created""#));

        let envelope = decode_envelope::<Payload>(encoded.as_bytes()).unwrap();
        assert_eq!(envelope.v, PROTOCOL_VERSION);
        assert_eq!(envelope.t, NotificationKind::RequestCreated);
        assert_eq!(envelope.d, payload);
    }

    #[test]
    fn encode_refuses_unknown_and_oversized_events() {
        let small = Payload {
            request_id: String::from("abc"),
        };
        assert!(matches!(
            encode_envelope("access_request.expired", &small),
            Err(ProtocolError::UnknownEventType(_))
        ));

        let huge = Payload {
            request_id: "x".repeat(MAX_EVENT_BYTES),
        };
        assert!(matches!(
            encode_envelope(EVENT_ACCESS_REQUEST_CREATED, &huge),
            Err(ProtocolError::OversizedPayload { .. })
        ));
    }

    #[test]
    fn parse_rejects_unsupported_version() {
        let error = parse_envelope(br#"{"v":99,"t":"access_request.created","d":{}}"#).unwrap_err();
        assert_eq!(
            error,
            ProtocolError::UnsupportedVersion {
                expected: PROTOCOL_VERSION,
                actual: 99,
            }
        );
    }

    #[test]
    fn parse_rejects_unknown_fields_and_events() {
        assert!(matches!(
            parse_envelope(br#"{"v":1,"t":"access_request.created","d":{},"extra":1}"#),
            Err(ProtocolError::InvalidJson(_))
        ));
        assert!(matches!(
            parse_envelope(br#"{"v":1,"t":"session.ready","d":{}}"#),
            Err(ProtocolError::InvalidJson(_))
        ));
    }
}
