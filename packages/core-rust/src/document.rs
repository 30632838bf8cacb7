//! Router documents and their wire parsing.
//!
//! Two document kinds are resolved from remote routers:
//!
//! - [`RouterDocument`]: module → server URL table for one application.
//! - [`RtmRouterDocument`]: the realtime-messaging server group assigned to
//!   one application.
//!
//! Both are immutable once built. A refresh produces a new document that
//! replaces the old one wholesale.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::module::Module;

/// Errors produced while decoding a router response body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DocumentError {
    #[error("response body is not valid JSON: {0}")]
    NotJson(String),
    #[error("response body is not a JSON object")]
    NotAnObject,
    #[error("field `{field}` has an unexpected type, expected {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },
    #[error("required field `{0}` is missing")]
    MissingField(&'static str),
    #[error("response carries no routing fields")]
    Empty,
}

/// Adds an `https://` scheme to bare host names and trims trailing slashes.
///
/// App routers answer with bare hosts (`"abc.api.lncld.net"`), while
/// administrators usually configure full URLs; both end up in the same form.
#[must_use]
pub fn normalize_server_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    }
}

/// Resolved module → server URL table for one application.
///
/// Absent modules are `None`; callers substitute the fallback URL for them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterDocument {
    pub api_server: Option<String>,
    pub engine_server: Option<String>,
    pub push_server: Option<String>,
    pub rtm_router_server: Option<String>,
    pub stats_server: Option<String>,
    /// Validity window in seconds, counted from the fetch time.
    pub ttl: u64,
    /// URL the document was fetched from.
    pub source_url: String,
}

impl RouterDocument {
    /// Returns the server URL for `module`, if the router supplied one.
    #[must_use]
    pub fn server(&self, module: Module) -> Option<&str> {
        let slot = match module {
            Module::Api => &self.api_server,
            Module::Engine => &self.engine_server,
            Module::Push => &self.push_server,
            Module::RtmRouter => &self.rtm_router_server,
            Module::Stats => &self.stats_server,
        };
        slot.as_deref()
    }

    /// Decodes an app-router response body.
    ///
    /// Missing or `null` module fields are kept as `None` (partial responses
    /// are valid). A missing `ttl` takes `default_ttl`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError`] if the body is not a JSON object or a field
    /// has the wrong type.
    pub fn from_response(
        body: &[u8],
        source_url: &str,
        default_ttl: u64,
    ) -> Result<Self, DocumentError> {
        let object = parse_object(body)?;
        let server = |module: Module| -> Result<Option<String>, DocumentError> {
            Ok(optional_string(&object, module.router_key())?
                .map(|raw| normalize_server_url(&raw)))
        };

        Ok(Self {
            api_server: server(Module::Api)?,
            engine_server: server(Module::Engine)?,
            push_server: server(Module::Push)?,
            rtm_router_server: server(Module::RtmRouter)?,
            stats_server: server(Module::Stats)?,
            ttl: optional_ttl(&object)?.unwrap_or(default_ttl),
            source_url: source_url.to_string(),
        })
    }
}

/// Realtime-messaging server group assigned to an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RtmRouterDocument {
    /// Primary RTM server.
    pub server: String,
    /// Optional secondary RTM server.
    pub secondary: Option<String>,
    pub group_id: Option<String>,
    /// RTM router URL that future lookups for this application should use.
    pub group_url: Option<String>,
    /// Validity window in seconds, counted from the fetch time.
    pub ttl: u64,
    /// RTM router URL the document was fetched from.
    pub source_url: String,
}

impl RtmRouterDocument {
    /// Decodes an RTM-router response body.
    ///
    /// Group fields are read under their snake_case names and, failing that,
    /// their camelCase names (`groupId`, `groupUrl`).
    ///
    /// # Errors
    ///
    /// - [`DocumentError::Empty`] if none of `server`, `secondary`,
    ///   `group_id`, `group_url` is present.
    /// - [`DocumentError::MissingField`] if other fields are present but
    ///   `server` is not.
    /// - [`DocumentError::NotJson`], [`DocumentError::NotAnObject`] or
    ///   [`DocumentError::InvalidField`] for malformed bodies.
    pub fn from_response(
        body: &[u8],
        source_url: &str,
        default_ttl: u64,
    ) -> Result<Self, DocumentError> {
        let object = parse_object(body)?;

        let server = optional_string(&object, "server")?;
        let secondary = optional_string(&object, "secondary")?;
        let group_id = match optional_string(&object, "group_id")? {
            Some(v) => Some(v),
            None => optional_string(&object, "groupId")?,
        };
        let group_url = match optional_string(&object, "group_url")? {
            Some(v) => Some(v),
            None => optional_string(&object, "groupUrl")?,
        };

        let Some(server) = server else {
            if secondary.is_none() && group_id.is_none() && group_url.is_none() {
                return Err(DocumentError::Empty);
            }
            return Err(DocumentError::MissingField("server"));
        };

        Ok(Self {
            server,
            secondary,
            group_id,
            group_url,
            ttl: optional_ttl(&object)?.unwrap_or(default_ttl),
            source_url: source_url.to_string(),
        })
    }
}

fn parse_object(body: &[u8]) -> Result<Map<String, Value>, DocumentError> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(DocumentError::NotAnObject),
        Err(e) => Err(DocumentError::NotJson(e.to_string())),
    }
}

/// Reads a string field; `null` and blank strings count as absent.
fn optional_string(
    object: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<String>, DocumentError> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(_) => Err(DocumentError::InvalidField {
            field,
            expected: "string",
        }),
    }
}

fn optional_ttl(object: &Map<String, Value>) -> Result<Option<u64>, DocumentError> {
    match object.get("ttl") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_u64().map(Some).ok_or(DocumentError::InvalidField {
            field: "ttl",
            expected: "non-negative integer",
        }),
        Some(_) => Err(DocumentError::InvalidField {
            field: "ttl",
            expected: "non-negative integer",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "https://app-router.com/2/route?appId=app";

    #[test]
    fn full_app_router_response() {
        let body = br#"{
            "api_server": "abc.api.lncld.net",
            "engine_server": "abc.engine.lncld.net",
            "push_server": "abc.push.lncld.net",
            "rtm_router_server": "abc.rtm.lncld.net",
            "stats_server": "https://abc.stats.lncld.net/",
            "ttl": 3600
        }"#;
        let doc = RouterDocument::from_response(body, SOURCE, 60).unwrap();
        assert_eq!(doc.server(Module::Api), Some("https://abc.api.lncld.net"));
        assert_eq!(doc.server(Module::Stats), Some("https://abc.stats.lncld.net"));
        assert_eq!(doc.server(Module::RtmRouter), Some("https://abc.rtm.lncld.net"));
        assert_eq!(doc.ttl, 3600);
        assert_eq!(doc.source_url, SOURCE);
    }

    #[test]
    fn partial_response_keeps_missing_modules_empty() {
        let body = br#"{"api_server": "abc.api.lncld.net", "push_server": null, "stats_server": ""}"#;
        let doc = RouterDocument::from_response(body, SOURCE, 120).unwrap();
        assert_eq!(doc.server(Module::Api), Some("https://abc.api.lncld.net"));
        assert_eq!(doc.server(Module::Push), None);
        assert_eq!(doc.server(Module::Stats), None);
        assert_eq!(doc.server(Module::Engine), None);
        assert_eq!(doc.ttl, 120, "missing ttl takes the default");
    }

    #[test]
    fn empty_object_is_a_valid_app_document() {
        let doc = RouterDocument::from_response(b"{}", SOURCE, 5).unwrap();
        assert!(Module::ALL.iter().all(|m| doc.server(*m).is_none()));
    }

    #[test]
    fn non_object_bodies_are_rejected() {
        assert_eq!(
            RouterDocument::from_response(b"[1,2]", SOURCE, 5),
            Err(DocumentError::NotAnObject)
        );
        assert!(matches!(
            RouterDocument::from_response(b"<html>", SOURCE, 5),
            Err(DocumentError::NotJson(_))
        ));
    }

    #[test]
    fn wrong_field_types_are_rejected() {
        assert_eq!(
            RouterDocument::from_response(br#"{"api_server": 7}"#, SOURCE, 5),
            Err(DocumentError::InvalidField {
                field: "api_server",
                expected: "string"
            })
        );
        assert!(matches!(
            RouterDocument::from_response(br#"{"ttl": -1}"#, SOURCE, 5),
            Err(DocumentError::InvalidField { field: "ttl", .. })
        ));
    }

    #[test]
    fn rtm_response_accepts_camel_case_group_fields() {
        let body = br#"{
            "server": "wss://rtm1.example.com",
            "secondary": "wss://rtm2.example.com",
            "groupId": "g1",
            "groupUrl": "https://group.example.com/v1/route",
            "ttl": 600
        }"#;
        let doc = RtmRouterDocument::from_response(body, "https://rtm/v1/route", 60).unwrap();
        assert_eq!(doc.server, "wss://rtm1.example.com");
        assert_eq!(doc.secondary.as_deref(), Some("wss://rtm2.example.com"));
        assert_eq!(doc.group_id.as_deref(), Some("g1"));
        assert_eq!(doc.group_url.as_deref(), Some("https://group.example.com/v1/route"));
        assert_eq!(doc.ttl, 600);
    }

    #[test]
    fn rtm_response_prefers_snake_case_group_fields() {
        let body = br#"{"server": "wss://a", "group_url": "https://snake", "groupUrl": "https://camel"}"#;
        let doc = RtmRouterDocument::from_response(body, "https://rtm", 60).unwrap();
        assert_eq!(doc.group_url.as_deref(), Some("https://snake"));
    }

    #[test]
    fn rtm_response_without_any_field_is_empty() {
        assert_eq!(
            RtmRouterDocument::from_response(b"{\"ttl\": 10}", "https://rtm", 60),
            Err(DocumentError::Empty)
        );
    }

    #[test]
    fn rtm_response_without_server_is_missing_field() {
        assert_eq!(
            RtmRouterDocument::from_response(br#"{"groupId": "g"}"#, "https://rtm", 60),
            Err(DocumentError::MissingField("server"))
        );
    }

    #[test]
    fn normalize_keeps_existing_scheme() {
        assert_eq!(normalize_server_url("wss://x.y/"), "wss://x.y");
        assert_eq!(normalize_server_url(" x.y "), "https://x.y");
    }
}
