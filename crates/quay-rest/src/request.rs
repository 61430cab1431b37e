//! Rebuildable API requests and the response wrapper.

use reqwest::Method;
use reqwest::Url;

use quay_core::{PageRequest, Result, ServerUrl};

use crate::transport;

/// Body content for an outbound request.
#[derive(Debug, Clone)]
pub enum RequestBody {
    /// No body.
    Empty,
    /// A JSON document.
    Json(serde_json::Value),
    /// Url-encoded form fields.
    Form(Vec<(String, String)>),
}

/// A transport-independent request description.
///
/// An `ApiRequest` is rebuilt into a fresh transport request on every
/// transmission, so a retry after re-authentication retransmits an
/// identical copy of the original.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    target: Target,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    body: RequestBody,
}

#[derive(Debug, Clone)]
enum Target {
    /// A path resolved against the session's base URL.
    Path(String),
    /// A fully-qualified URL, used verbatim.
    Absolute(Url),
}

impl ApiRequest {
    fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            target: Target::Path(path.into()),
            query: Vec::new(),
            headers: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    /// A GET request for a path under the session's base URL.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// A POST request for a path under the session's base URL.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// A PUT request for a path under the session's base URL.
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    /// A DELETE request for a path under the session's base URL.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// A GET request for a fully-qualified URL (e.g. a link returned by
    /// the server), bypassing base-URL resolution.
    pub fn get_url(url: Url) -> Self {
        Self {
            method: Method::GET,
            target: Target::Absolute(url),
            query: Vec::new(),
            headers: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    /// Append a query parameter.
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Append the offset/limit (and filter) parameters of a page request.
    pub fn with_page(mut self, page: &PageRequest) -> Self {
        self.query.extend(page.query_pairs());
        self
    }

    /// Attach a request-scoped header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Attach a JSON body.
    pub fn with_json(mut self, body: serde_json::Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    /// Attach a url-encoded form body.
    pub fn with_form<K: Into<String>, V: Into<String>>(
        mut self,
        fields: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        self.body = RequestBody::Form(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    /// The request method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request-scoped headers.
    pub(crate) fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// The request body.
    pub(crate) fn body(&self) -> &RequestBody {
        &self.body
    }

    /// Resolve the final URL, combining the base URL, target, and query
    /// parameters.
    pub fn resolve(&self, base: &ServerUrl) -> Result<Url> {
        let mut url = match &self.target {
            Target::Path(path) => base.join(path)?,
            Target::Absolute(url) => url.clone(),
        };
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(
                self.query.iter().map(|(k, v)| (k.as_str(), v.as_str())),
            );
        }
        Ok(url)
    }
}

/// A response from the transport.
///
/// The body is a single-owner resource: consuming accessors take the
/// response by value, and dropping an `ApiResponse` releases the
/// underlying connection on every exit path.
#[derive(Debug)]
pub struct ApiResponse {
    inner: reqwest::Response,
}

impl ApiResponse {
    pub(crate) fn new(inner: reqwest::Response) -> Self {
        Self { inner }
    }

    /// HTTP status code.
    pub fn status(&self) -> u16 {
        self.inner.status().as_u16()
    }

    /// Canonical reason phrase for the status, when known.
    pub fn reason(&self) -> Option<&'static str> {
        self.inner.status().canonical_reason()
    }

    /// First value of the named response header, when present and valid
    /// UTF-8.
    pub fn header(&self, name: &str) -> Option<String> {
        self.inner
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string())
    }

    /// All values of the named response header.
    pub fn header_values(&self, name: &str) -> Vec<String> {
        self.inner
            .headers()
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(|v| v.to_string())
            .collect()
    }

    /// The final URL of the response.
    pub fn url(&self) -> &Url {
        self.inner.url()
    }

    /// Deserialize the body as JSON, consuming the response.
    pub async fn json<T: serde::de::DeserializeOwned>(self) -> Result<T> {
        self.inner.json().await.map_err(transport::map_error)
    }

    /// Read the body as text, consuming the response.
    pub async fn text(self) -> Result<String> {
        self.inner.text().await.map_err(transport::map_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> ServerUrl {
        ServerUrl::new("https://quay.example.com").unwrap()
    }

    #[test]
    fn resolves_path_against_base() {
        let request = ApiRequest::get("api/projects");
        assert_eq!(
            request.resolve(&base()).unwrap().as_str(),
            "https://quay.example.com/api/projects"
        );
    }

    #[test]
    fn resolves_query_parameters() {
        let request = ApiRequest::get("api/projects").with_query("sort", "name");
        assert_eq!(
            request.resolve(&base()).unwrap().as_str(),
            "https://quay.example.com/api/projects?sort=name"
        );
    }

    #[test]
    fn page_parameters_appended_in_order() {
        let page = PageRequest::new().with_offset(10).with_limit(25);
        let request = ApiRequest::get("api/projects").with_page(&page);
        let url = request.resolve(&base()).unwrap();
        assert_eq!(url.query(), Some("offset=10&limit=25"));
    }

    #[test]
    fn absolute_target_ignores_base() {
        let url = Url::parse("https://other.example.com/api/items").unwrap();
        let request = ApiRequest::get_url(url.clone());
        assert_eq!(request.resolve(&base()).unwrap(), url);
    }
}
