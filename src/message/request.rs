//! Inbound request message.

use bytes::Bytes;

use super::{Headers, Message, QueryParams};

/// Canonical inbound request.
///
/// Built by the transport adapter from the native request; filters may
/// rewrite the method, URI, headers, query parameters, and body.
#[derive(Debug, Clone)]
pub struct RequestMessage {
    protocol: String,
    method: String,
    uri: String,
    query_params: QueryParams,
    headers: Headers,
    client_ip: String,
    scheme: String,
    body: Option<Bytes>,
}

impl RequestMessage {
    /// Create a request for `method` and `uri` (path plus optional query).
    ///
    /// The method is lower-cased and query parameters are decoded from the
    /// URI. Remaining transport fields start at their defaults: `HTTP/1.1`,
    /// scheme `http`, empty client IP, no headers, no body.
    pub fn new(method: &str, uri: impl Into<String>) -> Self {
        let uri = uri.into();
        let query_params = uri
            .split_once('?')
            .map(|(_, query)| parse_query(query))
            .unwrap_or_default();

        Self {
            protocol: "HTTP/1.1".to_string(),
            method: method.to_ascii_lowercase(),
            uri,
            query_params,
            headers: Headers::new(),
            client_ip: String::new(),
            scheme: "http".to_string(),
            body: None,
        }
    }

    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    pub fn with_query_params(mut self, query_params: QueryParams) -> Self {
        self.query_params = query_params;
        self
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.add(name, value);
        self
    }

    pub fn with_client_ip(mut self, client_ip: impl Into<String>) -> Self {
        self.client_ip = client_ip.into();
        self
    }

    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Protocol version, e.g. `HTTP/1.1`.
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// Lower-cased HTTP method.
    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn set_method(&mut self, method: &str) {
        self.method = method.to_ascii_lowercase();
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// The URI without its query string.
    pub fn path(&self) -> &str {
        self.uri.split_once('?').map_or(&self.uri, |(path, _)| path)
    }

    /// Rewrite the target URI. Query parameters are left untouched.
    pub fn set_uri(&mut self, uri: impl Into<String>) {
        self.uri = uri.into();
    }

    pub fn query_params(&self) -> &QueryParams {
        &self.query_params
    }

    pub fn query_params_mut(&mut self) -> &mut QueryParams {
        &mut self.query_params
    }

    /// Client address, empty when it could not be resolved.
    pub fn client_ip(&self) -> &str {
        &self.client_ip
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }
}

impl Message for RequestMessage {
    fn headers(&self) -> &Headers {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    fn body_slot(&self) -> &Option<Bytes> {
        &self.body
    }

    fn body_slot_mut(&mut self) -> &mut Option<Bytes> {
        &mut self.body
    }
}

/// Decode an `application/x-www-form-urlencoded` query string.
pub fn parse_query(query: &str) -> QueryParams {
    url::form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}
