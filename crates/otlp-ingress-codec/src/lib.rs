//! Payload Codec: turns an OTLP protobuf-typed request into the text
//! payload carried downstream, and decodes incoming OTLP HTTP bodies in
//! either wire encoding.

mod input_format;
mod json_normalizer;

pub use input_format::InputFormat;

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use otlp_ingress_common::{IngressError, MessageFormat, SignalKind};
use otlp_ingress_proto::opentelemetry::proto::collector::{
    logs::v1::ExportLogsServiceRequest, metrics::v1::ExportMetricsServiceRequest,
    trace::v1::ExportTraceServiceRequest,
};
use prost::Message;

/// A decoded OTLP request, still tagged by signal so the codec's caller
/// doesn't need a second dispatch on `SignalKind`.
#[derive(Debug, Clone)]
pub enum DecodedRequest {
    Traces(ExportTraceServiceRequest),
    Metrics(ExportMetricsServiceRequest),
    Logs(ExportLogsServiceRequest),
}

impl DecodedRequest {
    pub fn signal(&self) -> SignalKind {
        match self {
            DecodedRequest::Traces(_) => SignalKind::Traces,
            DecodedRequest::Metrics(_) => SignalKind::Metrics,
            DecodedRequest::Logs(_) => SignalKind::Logs,
        }
    }
}

/// Decode an HTTP request body for `signal` in the wire encoding `format`
/// selects. gRPC requests never reach this function: tonic already
/// decodes protobuf before a handler runs, so gRPC receivers build a
/// [`DecodedRequest`] directly from the message tonic handed them.
pub fn decode(signal: SignalKind, bytes: &[u8], format: InputFormat) -> Result<DecodedRequest, IngressError> {
    match format {
        InputFormat::Protobuf => decode_protobuf(signal, bytes),
        InputFormat::Json => decode_json(signal, bytes),
    }
}

fn decode_protobuf(signal: SignalKind, bytes: &[u8]) -> Result<DecodedRequest, IngressError> {
    match signal {
        SignalKind::Traces => ExportTraceServiceRequest::decode(bytes)
            .map(DecodedRequest::Traces)
            .map_err(|e| IngressError::DecodeError(e.to_string())),
        SignalKind::Metrics => ExportMetricsServiceRequest::decode(bytes)
            .map(DecodedRequest::Metrics)
            .map_err(|e| IngressError::DecodeError(e.to_string())),
        SignalKind::Logs => ExportLogsServiceRequest::decode(bytes)
            .map(DecodedRequest::Logs)
            .map_err(|e| IngressError::DecodeError(e.to_string())),
    }
}

fn decode_json(signal: SignalKind, bytes: &[u8]) -> Result<DecodedRequest, IngressError> {
    let mut value: serde_json::Value = serde_json::from_slice(bytes)
        .map_err(|e| IngressError::DecodeError(format!("invalid JSON: {e}")))?;
    json_normalizer::normalize(&mut value, None);

    match signal {
        SignalKind::Traces => serde_json::from_value(value)
            .map(DecodedRequest::Traces)
            .map_err(|e| IngressError::DecodeError(e.to_string())),
        SignalKind::Metrics => serde_json::from_value(value)
            .map(DecodedRequest::Metrics)
            .map_err(|e| IngressError::DecodeError(e.to_string())),
        SignalKind::Logs => serde_json::from_value(value)
            .map(DecodedRequest::Logs)
            .map_err(|e| IngressError::DecodeError(e.to_string())),
    }
}

/// Serialise a decoded request to the configured [`MessageFormat`].
///
/// JSON mode uses the standard protobuf-to-JSON mapping with default-value
/// fields included and original proto field names preserved, which falls
/// out of `serde_json::to_string` on the generated struct directly (its
/// derived `Serialize` impl is not renamed to camelCase, and its fields are
/// not `Option`-wrapped where the proto field has a scalar default).
/// Protobuf mode returns the ASCII base64 (standard alphabet, padding
/// retained) encoding of the wire-format bytes.
pub fn encode(request: &DecodedRequest, format: MessageFormat) -> Result<String, IngressError> {
    match format {
        MessageFormat::Json => encode_json(request),
        MessageFormat::Protobuf => Ok(encode_protobuf_base64(request)),
    }
}

fn encode_json(request: &DecodedRequest) -> Result<String, IngressError> {
    let result = match request {
        DecodedRequest::Traces(r) => serde_json::to_string(r),
        DecodedRequest::Metrics(r) => serde_json::to_string(r),
        DecodedRequest::Logs(r) => serde_json::to_string(r),
    };
    result.map_err(|e| IngressError::EncodingError(e.to_string()))
}

fn encode_protobuf_base64(request: &DecodedRequest) -> String {
    let bytes = match request {
        DecodedRequest::Traces(r) => r.encode_to_vec(),
        DecodedRequest::Metrics(r) => r.encode_to_vec(),
        DecodedRequest::Logs(r) => r.encode_to_vec(),
    };
    BASE64_STANDARD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use otlp_ingress_proto::opentelemetry::proto::{
        collector::trace::v1::ExportTraceServiceRequest,
        common::v1::{any_value, AnyValue, InstrumentationScope, KeyValue},
        resource::v1::Resource,
        trace::v1::{ResourceSpans, ScopeSpans, Span},
    };

    fn sample_trace_request() -> ExportTraceServiceRequest {
        ExportTraceServiceRequest {
            resource_spans: vec![ResourceSpans {
                resource: Some(Resource {
                    attributes: vec![KeyValue {
                        key: "service.name".to_string(),
                        value: Some(AnyValue {
                            value: Some(any_value::Value::StringValue("svc-1".to_string())),
                        }),
                    }],
                    dropped_attributes_count: 0,
                }),
                scope_spans: vec![ScopeSpans {
                    scope: Some(InstrumentationScope::default()),
                    spans: vec![Span {
                        name: "op".to_string(),
                        ..Default::default()
                    }],
                    schema_url: String::new(),
                }],
                schema_url: String::new(),
            }],
        }
    }

    #[test]
    fn json_encode_includes_resource_spans_and_service_name() {
        let req = DecodedRequest::Traces(sample_trace_request());
        let text = encode(&req, MessageFormat::Json).unwrap();
        assert!(text.contains("resourceSpans") == false); // snake_case, not camelCase
        assert!(text.contains("resource_spans"));
        assert!(text.contains("svc-1"));
    }

    #[test]
    fn protobuf_encode_round_trips_through_base64() {
        let original = sample_trace_request();
        let req = DecodedRequest::Traces(original.clone());
        let text = encode(&req, MessageFormat::Protobuf).unwrap();
        assert!(text
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '='));
        let bytes = BASE64_STANDARD.decode(text).unwrap();
        let decoded = ExportTraceServiceRequest::decode(bytes.as_slice()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn json_decode_accepts_camel_case_and_ignores_unknown_fields() {
        let body = serde_json::json!({
            "resourceSpans": [{
                "resource": {"attributes": []},
                "scopeSpans": [{
                    "spans": [{"name": "op", "traceId": "0102030405060708090a0b0c0d0e0f10", "someUnknownField": 42}]
                }]
            }]
        })
        .to_string();
        let decoded = decode(SignalKind::Traces, body.as_bytes(), InputFormat::Json).unwrap();
        match decoded {
            DecodedRequest::Traces(r) => {
                assert_eq!(r.resource_spans.len(), 1);
                assert_eq!(r.resource_spans[0].scope_spans[0].spans[0].name, "op");
            }
            _ => panic!("expected traces"),
        }
    }
}
