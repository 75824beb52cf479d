//! Wire envelopes.
//!
//! Every message is a map with a `kind` key. Requests carry a client-chosen
//! `id` that the matching response echoes verbatim; notifications and events
//! carry the subscription they were delivered for.

use rc_core::{RcError, SubscriptionId, Value};

/// `kind` of a client request.
pub const KIND_REQUEST: &str = "request";
/// `kind` of a reply.
pub const KIND_RESPONSE: &str = "response";
/// `kind` of a property change push.
pub const KIND_NOTIFICATION: &str = "notification";
/// `kind` of an event push.
pub const KIND_EVENT: &str = "event";

/// Event sent once when a connection opens.
pub const CONNECTION_ESTABLISHED: &str = "connection.established";

/// Incoming request.
#[derive(Clone, Debug, PartialEq)]
pub struct RpcRequest {
    /// Correlation id, echoed in the response. A string or an integer.
    pub id: Value,
    /// Method name (e.g. `object.get`).
    pub method: String,
    /// Parameters map, `Null` when absent.
    pub params: Value,
}

impl RpcRequest {
    /// Create a request.
    pub fn new(id: impl Into<Value>, method: impl Into<String>, params: Value) -> Self {
        Self {
            id: id.into(),
            method: method.into(),
            params,
        }
    }

    /// Read a request out of a decoded frame.
    ///
    /// A bad envelope yields the error response to send back, carrying the
    /// request id when one could be read.
    pub fn from_value(frame: Value) -> Result<Self, RpcResponse> {
        let Value::Map(mut map) = frame else {
            return Err(RpcResponse::error(
                Value::Null,
                &RcError::invalid_request("message must be a map"),
            ));
        };
        let id = match map.shift_remove("id") {
            Some(id @ (Value::String(_) | Value::Int(_))) => id,
            Some(_) => {
                return Err(RpcResponse::error(
                    Value::Null,
                    &RcError::invalid_request("'id' must be a string or an integer"),
                ));
            }
            None => return Err(RpcResponse::error(Value::Null, &RcError::invalid_request("missing 'id'"))),
        };
        if let Some(kind) = map.get("kind") {
            if kind.as_str() != Some(KIND_REQUEST) {
                return Err(RpcResponse::error(
                    id,
                    &RcError::invalid_request("only requests may be sent to the server"),
                ));
            }
        }
        let method = match map.shift_remove("method") {
            Some(Value::String(method)) => method,
            _ => return Err(RpcResponse::error(id, &RcError::invalid_request("missing 'method'"))),
        };
        let params = map.shift_remove("params").unwrap_or(Value::Null);
        Ok(Self { id, method, params })
    }

    /// Envelope as a value.
    pub fn to_value(&self) -> Value {
        Value::map([
            ("kind", Value::from(KIND_REQUEST)),
            ("id", self.id.clone()),
            ("method", Value::from(self.method.as_str())),
            ("params", self.params.clone()),
        ])
    }
}

/// Error body inside a failed response or an HTTP error.
#[derive(Clone, Debug, PartialEq)]
pub struct RpcErrorBody {
    /// Machine-readable code (`NOT_FOUND`, `TYPE_MISMATCH`, ...).
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// First path segment that failed to resolve.
    pub segment: Option<String>,
    /// Interpretations of an ambiguous path.
    pub candidates: Vec<String>,
}

impl RpcErrorBody {
    /// Body for `err`.
    pub fn from_error(err: &RcError) -> Self {
        let candidates = match err {
            RcError::Ambiguous { candidates, .. } => candidates.clone(),
            _ => Vec::new(),
        };
        Self {
            code: err.code().to_owned(),
            message: err.to_string(),
            segment: err.segment().map(str::to_owned),
            candidates,
        }
    }

    /// Body as a value.
    pub fn to_value(&self) -> Value {
        let mut entries = vec![
            ("code", Value::from(self.code.as_str())),
            ("message", Value::from(self.message.as_str())),
        ];
        if let Some(segment) = &self.segment {
            entries.push(("segment", Value::from(segment.as_str())));
        }
        if !self.candidates.is_empty() {
            entries.push((
                "candidates",
                Value::Array(self.candidates.iter().map(|c| Value::from(c.as_str())).collect()),
            ));
        }
        Value::map(entries)
    }
}

/// Reply to a request.
#[derive(Clone, Debug, PartialEq)]
pub struct RpcResponse {
    /// Echoed correlation id.
    pub id: Value,
    /// Result or error.
    pub outcome: Result<Value, RpcErrorBody>,
}

impl RpcResponse {
    /// Successful reply.
    pub fn success(id: Value, result: Value) -> Self {
        Self { id, outcome: Ok(result) }
    }

    /// Failed reply.
    pub fn error(id: Value, err: &RcError) -> Self {
        Self {
            id,
            outcome: Err(RpcErrorBody::from_error(err)),
        }
    }

    /// Whether the request succeeded.
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Envelope as a value.
    pub fn to_value(&self) -> Value {
        let mut entries = vec![("kind", Value::from(KIND_RESPONSE)), ("id", self.id.clone())];
        match &self.outcome {
            Ok(result) => {
                entries.push(("ok", Value::Bool(true)));
                entries.push(("result", result.clone()));
            }
            Err(body) => {
                entries.push(("ok", Value::Bool(false)));
                entries.push(("error", body.to_value()));
            }
        }
        Value::map(entries)
    }
}

/// Property change push.
#[derive(Clone, Debug, PartialEq)]
pub struct Notification {
    /// Subscription the value was delivered for.
    pub subscription: SubscriptionId,
    /// Address the client subscribed with.
    pub target: String,
    /// New value.
    pub value: Value,
}

impl Notification {
    /// Envelope as a value.
    pub fn to_value(&self) -> Value {
        Value::map([
            ("kind", Value::from(KIND_NOTIFICATION)),
            ("subscription", Value::from(self.subscription.as_str())),
            ("target", Value::from(self.target.as_str())),
            ("value", self.value.clone()),
        ])
    }
}

/// Event push.
#[derive(Clone, Debug, PartialEq)]
pub struct RpcEvent {
    /// Subscription, absent for connection-level events.
    pub subscription: Option<SubscriptionId>,
    /// Event kind (`object.destroyed`, `preset.modified`, ...).
    pub event: String,
    /// Payload.
    pub payload: Value,
}

impl RpcEvent {
    /// Connection-level event.
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        Self {
            subscription: None,
            event: event.into(),
            payload,
        }
    }

    /// Envelope as a value.
    pub fn to_value(&self) -> Value {
        let mut entries = vec![("kind", Value::from(KIND_EVENT))];
        if let Some(subscription) = &self.subscription {
            entries.push(("subscription", Value::from(subscription.as_str())));
        }
        entries.push(("event", Value::from(self.event.as_str())));
        entries.push(("payload", self.payload.clone()));
        Value::map(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn request_map(entries: Vec<(&str, Value)>) -> Value {
        Value::map(entries)
    }

    #[test]
    fn parses_request() {
        let frame = request_map(vec![
            ("kind", "request".into()),
            ("id", "r1".into()),
            ("method", "object.get".into()),
            ("params", Value::map([("path", Value::from("/Game/Light.Intensity"))])),
        ]);
        let req = RpcRequest::from_value(frame).unwrap();
        assert_eq!(req.id, Value::from("r1"));
        assert_eq!(req.method, "object.get");
        assert_eq!(req.params.get("path").and_then(Value::as_str), Some("/Game/Light.Intensity"));
    }

    #[test]
    fn integer_id_and_missing_params() {
        let frame = request_map(vec![("id", Value::Int(7)), ("method", "system.ping".into())]);
        let req = RpcRequest::from_value(frame).unwrap();
        assert_eq!(req.id, Value::Int(7));
        assert!(req.params.is_null());
    }

    #[test]
    fn missing_method_echoes_id() {
        let frame = request_map(vec![("id", "r9".into())]);
        let resp = RpcRequest::from_value(frame).unwrap_err();
        assert_eq!(resp.id, Value::from("r9"));
        assert_matches!(&resp.outcome, Err(body) if body.code == "INVALID_REQUEST");
    }

    #[test]
    fn missing_id_gets_null() {
        let resp = RpcRequest::from_value(request_map(vec![("method", "x".into())])).unwrap_err();
        assert_eq!(resp.id, Value::Null);
    }

    #[test]
    fn non_map_rejected() {
        let resp = RpcRequest::from_value(Value::Int(3)).unwrap_err();
        assert!(!resp.is_ok());
    }

    #[test]
    fn wrong_kind_rejected() {
        let frame = request_map(vec![
            ("kind", "notification".into()),
            ("id", "r1".into()),
            ("method", "x".into()),
        ]);
        let resp = RpcRequest::from_value(frame).unwrap_err();
        assert_eq!(resp.id, Value::from("r1"));
    }

    #[test]
    fn response_shapes() {
        let ok = RpcResponse::success("a".into(), Value::Float(2.5)).to_value();
        assert_eq!(ok.get("kind").and_then(Value::as_str), Some("response"));
        assert_eq!(ok.get("ok"), Some(&Value::Bool(true)));
        assert_eq!(ok.get("result"), Some(&Value::Float(2.5)));

        let err = RcError::NotFound {
            message: "no object".into(),
            segment: Some("nonexistent".into()),
        };
        let failed = RpcResponse::error("b".into(), &err).to_value();
        let body = failed.get("error").unwrap();
        assert_eq!(body.get("code").and_then(Value::as_str), Some("NOT_FOUND"));
        assert_eq!(body.get("segment").and_then(Value::as_str), Some("nonexistent"));
        assert!(failed.get("result").is_none());
    }

    #[test]
    fn ambiguous_lists_candidates() {
        let err = RcError::Ambiguous {
            path: "Rig.Arm.X".into(),
            candidates: vec!["Rig | Arm.X".into(), "Rig.Arm | X".into()],
        };
        let body = RpcErrorBody::from_error(&err).to_value();
        assert_eq!(body.get("candidates").and_then(Value::as_array).map(Vec::len), Some(2));
    }

    #[test]
    fn push_shapes() {
        let n = Notification {
            subscription: SubscriptionId::from("s1"),
            target: "light1.intensity".into(),
            value: Value::Float(1.0),
        }
        .to_value();
        assert_eq!(n.get("kind").and_then(Value::as_str), Some("notification"));
        assert_eq!(n.get("target").and_then(Value::as_str), Some("light1.intensity"));

        let e = RpcEvent::new(CONNECTION_ESTABLISHED, Value::map([("sessionId", Value::from("x"))])).to_value();
        assert_eq!(e.get("event").and_then(Value::as_str), Some("connection.established"));
        assert!(e.get("subscription").is_none());
    }
}
