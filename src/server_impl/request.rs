use std::borrow::Cow;

use bytes::{Bytes, BytesMut};
use compact_str::CompactString;
use memchr::memchr;
use serde_json::Value;
use tracing::{debug, trace};

use crate::domain::cookie::parse_cookie_header;
use crate::domain::errors::AdapterError;
use crate::domain::params::{parse_pairs, MultiParams};
use crate::server_impl::channel::{MessageKind, NoReceive, Receive};
use crate::server_impl::scope::{latin1_decode, latin1_encode, Scope};
use crate::{AnyResult, FnvIndexMap, DEFAULT_HOST, DEFAULT_SCHEME};

/// Read-only view over a gateway [`Scope`] and the receiver for its body.
///
/// Nothing is cached: every accessor recomputes its result from the scope,
/// so repeated calls are not free.
#[derive(Debug)]
pub struct Request<R = NoReceive> {
    scope: Scope,
    receive: R,
}

impl<R> Request<R> {
    pub fn new(scope: Scope, receive: R) -> Self {
        Self { scope, receive }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn method(&self) -> &str {
        &self.scope.method
    }

    pub fn scheme(&self) -> &str {
        self.scope
            .scheme
            .as_deref()
            .filter(|scheme| !scheme.is_empty())
            .unwrap_or(DEFAULT_SCHEME)
    }

    /// Lower-cased header names to values, both decoded as latin-1.
    ///
    /// A name sent more than once keeps its last value.
    pub fn headers(&self) -> FnvIndexMap<CompactString, String> {
        self.scope
            .headers
            .iter()
            .map(|(name, value)| {
                let name = name
                    .iter()
                    .flat_map(|&byte| char::from(byte).to_lowercase())
                    .collect::<CompactString>();
                (name, latin1_decode(value))
            })
            .collect()
    }

    pub fn host(&self) -> String {
        self.headers()
            .swap_remove("host")
            .filter(|host| !host.is_empty())
            .unwrap_or_else(|| DEFAULT_HOST.to_owned())
    }

    /// `raw_path` decoded as latin-1 when the gateway supplied it, otherwise
    /// the already decoded `path`.
    pub fn path(&self) -> Cow<'_, str> {
        match &self.scope.raw_path {
            Some(raw_path) => Cow::Owned(latin1_decode(raw_path)),
            None => Cow::Borrowed(&self.scope.path),
        }
    }

    pub fn query_string(&self) -> String {
        latin1_decode(&self.scope.query_string)
    }

    pub fn full_path(&self) -> String {
        let path = self.path();
        let query_string = self.query_string();
        if query_string.is_empty() {
            path.into_owned()
        } else {
            format!("{path}?{query_string}")
        }
    }

    /// `scheme://host/path?query`, without a fragment.
    pub fn url(&self) -> String {
        let path = self.path();
        let separator = if path.is_empty() || path.starts_with('/') {
            ""
        } else {
            "/"
        };

        let mut url = format!("{}://{}{separator}{path}", self.scheme(), self.host());
        let query_string = self.query_string();
        if !query_string.is_empty() {
            url.push('?');
            url.push_str(&query_string);
        }
        url
    }

    /// Path variables captured by the router, empty when there are none.
    pub fn url_vars(&self) -> FnvIndexMap<String, String> {
        self.scope
            .url_route
            .as_ref()
            .map(|route| route.kwargs.clone())
            .unwrap_or_default()
    }

    pub fn cookies(&self) -> FnvIndexMap<String, String> {
        self.headers()
            .get("cookie")
            .map(|header| parse_cookie_header(header))
            .unwrap_or_default()
    }

    /// Query string parameters; blank values are dropped.
    pub fn args(&self) -> MultiParams {
        MultiParams::from_query(&self.query_string())
    }

    pub fn actor(&self) -> Option<&Value> {
        self.scope.actor.as_ref()
    }
}

impl<R: Receive> Request<R> {
    /// Pulls `http.request` messages until one arrives without `more_body`.
    ///
    /// Drive this once per request: the receiver has signalled completion
    /// afterwards and a second call depends on what it does next.
    pub async fn post_body(&mut self) -> AnyResult<Bytes> {
        let mut body = BytesMut::new();
        loop {
            let message = self.receive.receive().await?;
            if !message.is(MessageKind::Request) {
                return Err(AdapterError::UnexpectedMessage {
                    expected: MessageKind::Request.as_str(),
                    received: message.kind,
                }
                .into());
            }

            trace!(
                bytes = message.body.len(),
                more_body = message.more_body,
                "received body chunk"
            );
            body.extend_from_slice(&message.body);
            if !message.more_body {
                break;
            }
        }

        debug!(bytes = body.len(), "request body assembled");
        Ok(body.freeze())
    }

    /// The body parsed as a urlencoded form, blank values included.
    ///
    /// Unlike [`Request::args`] this is single-valued: a repeated field keeps
    /// its last value.
    pub async fn post_vars(&mut self) -> AnyResult<FnvIndexMap<String, String>> {
        let body = self.post_body().await?;
        let form = std::str::from_utf8(&body).map_err(AdapterError::from)?;

        Ok(parse_pairs(form, true).collect())
    }
}

impl Request {
    /// Builds a `GET` request over `http` without a gateway behind it.
    ///
    /// Reading the body of such a request fails with
    /// [`AdapterError::NoReceiver`].
    pub fn fake(path_with_query_string: &str) -> Self {
        Self::fake_with(path_with_query_string, "GET", DEFAULT_SCHEME)
    }

    pub fn fake_with(path_with_query_string: &str, method: &str, scheme: &str) -> Self {
        let (path, query_string) = match memchr(b'?', path_with_query_string.as_bytes()) {
            Some(idx) => (
                &path_with_query_string[..idx],
                &path_with_query_string[idx + 1..],
            ),
            None => (path_with_query_string, ""),
        };

        let mut scope = Scope::new(method, path)
            .with_scheme(scheme)
            .with_query_string(
                latin1_encode(query_string).unwrap_or_else(|| query_string.as_bytes().to_vec()),
            );
        scope.raw_path = latin1_encode(path);

        Self::new(scope, NoReceive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server_impl::channel::ReceiveMessage;
    use serde_json::json;
    use std::collections::VecDeque;

    fn with_body(
        chunks: impl IntoIterator<Item = ReceiveMessage>,
    ) -> Request<VecDeque<ReceiveMessage>> {
        Request::new(Scope::new("POST", "/submit"), chunks.into_iter().collect())
    }

    #[test]
    fn success_headers_are_lower_cased_and_last_wins() {
        let scope = Scope::new("GET", "/")
            .with_header("Content-Type", "text/html")
            .with_header("X-Thing", "first")
            .with_header("x-thing", "second");
        let request = Request::new(scope, NoReceive);

        let headers = request.headers();

        assert_eq!(headers.len(), 2);
        assert_eq!(headers["content-type"], "text/html");
        assert_eq!(headers["x-thing"], "second");
        assert!(headers.keys().all(|k| k.chars().all(|c| !c.is_uppercase())));
    }

    #[test]
    fn success_header_values_round_trip_latin1() {
        let raw_value = (1..=255).collect::<Vec<u8>>();
        let request = Request::new(
            Scope::new("GET", "/").with_header(&b"X-RAW"[..], raw_value.clone()),
            NoReceive,
        );

        let headers = request.headers();

        assert_eq!(latin1_encode(&headers["x-raw"]), Some(raw_value));
    }

    #[test]
    fn success_host_defaults() {
        assert_eq!(Request::fake("/").host(), "localhost");

        let empty = Request::new(Scope::new("GET", "/").with_header("host", ""), NoReceive);
        assert_eq!(empty.host(), "localhost");

        let set = Request::new(
            Scope::new("GET", "/").with_header("Host", "example.com:8000"),
            NoReceive,
        );
        assert_eq!(set.host(), "example.com:8000");
    }

    #[test]
    fn success_scheme_defaults() {
        let mut scope = Scope::new("GET", "/");
        assert_eq!(Request::new(scope.clone(), NoReceive).scheme(), "http");

        scope.scheme = Some(String::new());
        assert_eq!(Request::new(scope.clone(), NoReceive).scheme(), "http");

        scope.scheme = Some("https".to_owned());
        assert_eq!(Request::new(scope, NoReceive).scheme(), "https");
    }

    #[test]
    fn success_path_prefers_raw_path() {
        let scope = Scope::new("GET", "/café").with_raw_path(&b"/caf%C3%A9"[..]);
        assert_eq!(Request::new(scope, NoReceive).path(), "/caf%C3%A9");

        let scope = Scope::new("GET", "/x").with_raw_path(vec![b'/', 0xe9]);
        assert_eq!(Request::new(scope, NoReceive).path(), "/\u{e9}");

        let scope = Scope::new("GET", "/café");
        assert_eq!(Request::new(scope, NoReceive).path(), "/café");
    }

    #[test]
    fn success_full_path() {
        assert_eq!(Request::fake("/x/y?z=1").full_path(), "/x/y?z=1");
        assert_eq!(Request::fake("/x/y").full_path(), "/x/y");
        assert_eq!(Request::fake("/x/y?").full_path(), "/x/y");
    }

    #[test]
    fn success_url() {
        let request = Request::fake_with("/search?q=1", "GET", "https");
        assert_eq!(request.url(), "https://localhost/search?q=1");

        let request = Request::new(
            Scope::new("GET", "relative").with_header("host", "example.com"),
            NoReceive,
        );
        assert_eq!(request.url(), "http://example.com/relative");
    }

    #[test]
    fn success_fake_scope() {
        let request = Request::fake_with("/a?b=c", "DELETE", "https");
        let scope = request.scope();

        assert_eq!(request.method(), "DELETE");
        assert_eq!(scope.kind, "http");
        assert_eq!(scope.http_version.as_deref(), Some("1.1"));
        assert_eq!(scope.raw_path.as_deref(), Some(&b"/a"[..]));
        assert_eq!(request.query_string(), "b=c");
    }

    #[test]
    fn success_args() {
        let args = Request::fake("/search?q=hello+world&tag=a&tag=b").args();

        assert_eq!(args.get_list("tag"), ["a", "b"]);
        assert_eq!(args.get("q"), Some("hello world"));
    }

    #[test]
    fn success_cookies() {
        let request = Request::new(
            Scope::new("GET", "/").with_header("Cookie", "session=abc; theme=\"dark mode\""),
            NoReceive,
        );

        let cookies = request.cookies();

        assert_eq!(cookies["session"], "abc");
        assert_eq!(cookies["theme"], "dark mode");
        assert!(Request::fake("/").cookies().is_empty());
    }

    #[test]
    fn success_url_vars_and_actor() {
        let scope = Scope::new("GET", "/db/table")
            .with_url_vars([("database", "db"), ("table", "table")])
            .with_actor(json!({"id": "root"}));
        let request = Request::new(scope, NoReceive);

        assert_eq!(request.url_vars()["database"], "db");
        assert_eq!(request.actor(), Some(&json!({"id": "root"})));

        let bare = Request::fake("/");
        assert!(bare.url_vars().is_empty());
        assert_eq!(bare.actor(), None);
    }

    #[tokio::test]
    async fn success_post_body_joins_chunks() {
        let mut request = with_body([
            ReceiveMessage::chunk("hello ", true),
            ReceiveMessage::chunk("", true),
            ReceiveMessage::chunk("world", false),
        ]);

        assert_eq!(request.post_body().await.unwrap(), "hello world");
    }

    #[tokio::test]
    async fn success_post_vars_keeps_blank_and_last_value() {
        let mut request = with_body([ReceiveMessage::chunk(
            "name=Cleo&empty=&tag=a&tag=b&msg=hi+there%21",
            false,
        )]);

        let vars = request.post_vars().await.unwrap();

        assert_eq!(vars["name"], "Cleo");
        assert_eq!(vars["empty"], "");
        assert_eq!(vars["tag"], "b");
        assert_eq!(vars["msg"], "hi there!");
        assert_eq!(vars.keys().collect::<Vec<_>>(), ["name", "empty", "tag", "msg"]);
    }

    #[tokio::test]
    async fn failure_post_body_unexpected_message() {
        let mut request = with_body([
            ReceiveMessage::chunk("partial", true),
            ReceiveMessage::disconnect(),
        ]);

        let err = request.post_body().await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<AdapterError>(),
            Some(AdapterError::UnexpectedMessage { received, .. }) if received == "http.disconnect"
        ));
    }

    #[tokio::test]
    async fn failure_post_vars_invalid_utf8() {
        let mut request = with_body([ReceiveMessage::chunk(&b"a=\xff"[..], false)]);

        let err = request.post_vars().await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<AdapterError>(),
            Some(AdapterError::Utf8(_))
        ));
    }

    #[tokio::test]
    async fn failure_fake_has_no_body() {
        let mut request = Request::fake("/");

        let err = request.post_body().await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<AdapterError>(),
            Some(AdapterError::NoReceiver)
        ));
    }
}
