/// How an incoming HTTP request body is encoded. Detected from the
/// `Content-Type` header; protobuf is the fallback for anything
/// unrecognised, including a missing header, because that is the OTLP
/// wire default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Protobuf,
    Json,
}

impl InputFormat {
    /// Detect format from a `Content-Type` header value.
    ///
    /// Per the OTLP HTTP spec: if the header contains the substring
    /// `json`, parse as OTLP JSON; otherwise protobuf, which covers the
    /// canonical `application/x-protobuf` as well as any missing or
    /// unrecognised content-type.
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        match content_type {
            Some(ct) if ct.to_ascii_lowercase().contains("json") => Self::Json,
            _ => Self::Protobuf,
        }
    }
}
