use std::fmt::Display;

use bytes::Bytes;
use http::StatusCode;
use serde::Serialize;
use tracing::{debug, trace};

use crate::domain::cookie::{serialize_set_cookie, CookieOptions};
use crate::domain::errors::AdapterResult;
use crate::server_impl::channel::{SendMessage, Transmit};
use crate::{AnyResult, FnvIndexMap, DEFAULT_CONTENT_TYPE};

pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";
pub const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Response accumulated by the application and rendered once into the
/// gateway's `send` side.
#[derive(Debug, Clone)]
pub struct Response {
    pub body: Bytes,
    pub status: StatusCode,
    /// Extra headers. `content-type` is always taken from `content_type`.
    pub headers: FnvIndexMap<String, String>,
    pub content_type: String,
    set_cookie_headers: Vec<String>,
}

impl Response {
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            status: StatusCode::OK,
            headers: FnvIndexMap::default(),
            content_type: DEFAULT_CONTENT_TYPE.to_owned(),
            set_cookie_headers: Vec::new(),
        }
    }

    pub fn html(body: impl Into<Bytes>) -> Self {
        Self::new(body).with_content_type(HTML_CONTENT_TYPE)
    }

    pub fn text(body: impl Display) -> Self {
        Self::new(body.to_string()).with_content_type(TEXT_CONTENT_TYPE)
    }

    pub fn json<T: Serialize>(body: &T) -> AnyResult<Self> {
        let body = simd_json::to_string(body)?;
        Ok(Self::new(body).with_content_type(JSON_CONTENT_TYPE))
    }

    /// `302 Found` pointing at `path`.
    pub fn redirect(path: impl Into<String>) -> Self {
        Self::redirect_with(path, StatusCode::FOUND, FnvIndexMap::<String, String>::default())
    }

    /// `Location` is written after `headers`, so it wins over any location
    /// header passed in.
    pub fn redirect_with<I, K, V>(path: impl Into<String>, status: StatusCode, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::new(Bytes::new())
            .with_status(status)
            .with_headers(headers)
            .with_header("Location", path)
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Sets a header, replacing any existing one whose name matches
    /// case-insensitively.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        insert_header(&mut self.headers, name.into(), value.into());
        self
    }

    pub fn with_headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (name, value) in headers {
            insert_header(&mut self.headers, name.into(), value.into());
        }
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Adds a cookie with the default attributes (`Path=/`, `SameSite=lax`).
    pub fn set_cookie(&mut self, name: &str, value: &str) -> AdapterResult<()> {
        self.set_cookie_with(name, value, &CookieOptions::default())
    }

    /// Adds a cookie directive. Directives accumulate in call order, including
    /// repeats of the same name; nothing is recorded when validation fails.
    pub fn set_cookie_with(
        &mut self,
        name: &str,
        value: &str,
        options: &CookieOptions,
    ) -> AdapterResult<()> {
        let directive = serialize_set_cookie(name, value, options).map_err(|err| {
            debug!(cookie = name, %err, "cookie rejected");
            err
        })?;

        trace!(%directive, "cookie recorded");
        self.set_cookie_headers.push(directive);
        Ok(())
    }

    pub fn set_cookie_headers(&self) -> &[String] {
        &self.set_cookie_headers
    }

    /// Sends `http.response.start` followed by `http.response.body`.
    ///
    /// Regular headers come first, then one `set-cookie` per recorded cookie.
    pub async fn render<T: Transmit>(self, transmit: &mut T) -> AnyResult<()> {
        let Self {
            body,
            status,
            mut headers,
            content_type,
            set_cookie_headers,
        } = self;

        insert_header(&mut headers, "content-type".to_owned(), content_type);
        let cookies = set_cookie_headers.len();
        let raw_headers = headers
            .into_iter()
            .map(|(name, value)| (Bytes::from(name), Bytes::from(value)))
            .chain(
                set_cookie_headers
                    .into_iter()
                    .map(|directive| (Bytes::from_static(b"set-cookie"), Bytes::from(directive))),
            )
            .collect::<Vec<_>>();

        debug!(
            status = status.as_u16(),
            headers = raw_headers.len(),
            cookies,
            body = body.len(),
            "rendering response"
        );
        transmit
            .transmit(SendMessage::ResponseStart {
                status: status.as_u16(),
                headers: raw_headers,
            })
            .await?;
        transmit.transmit(SendMessage::ResponseBody { body }).await
    }
}

fn insert_header(headers: &mut FnvIndexMap<String, String>, name: String, value: String) {
    headers.retain(|existing, _| !unicase::eq_ascii(existing.as_str(), name.as_str()));
    headers.insert(name, value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cookie::Expires;
    use crate::domain::errors::AdapterError;
    use crate::server_impl::channel::FnTransmit;
    use serde_json::{json, Value};

    struct Rendered {
        status: u16,
        headers: Vec<(String, String)>,
        body: Bytes,
    }

    async fn render(response: Response) -> Rendered {
        let mut sent = Vec::<SendMessage>::new();
        response.render(&mut sent).await.unwrap();

        match <[SendMessage; 2]>::try_from(sent) {
            Ok(
                [SendMessage::ResponseStart { status, headers }, SendMessage::ResponseBody { body }],
            ) => Rendered {
                status,
                headers: headers
                    .into_iter()
                    .map(|(name, value)| {
                        (
                            String::from_utf8(name.to_vec()).unwrap(),
                            String::from_utf8(value.to_vec()).unwrap(),
                        )
                    })
                    .collect(),
                body,
            },
            other => panic!("expected start then body, got {other:?}"),
        }
    }

    fn pair(name: &str, value: &str) -> (String, String) {
        (name.to_owned(), value.to_owned())
    }

    #[tokio::test]
    async fn success_default_render() {
        let rendered = render(Response::new("hello")).await;

        assert_eq!(rendered.status, 200);
        assert_eq!(rendered.headers, [pair("content-type", "text/plain")]);
        assert_eq!(rendered.body, "hello");
    }

    #[tokio::test]
    async fn success_content_type_overrides_extra_headers() {
        let response = Response::html("<p>hi</p>")
            .with_status(StatusCode::CREATED)
            .with_headers([("X-Frame-Options", "DENY"), ("Content-Type", "text/csv")]);

        let rendered = render(response).await;

        assert_eq!(rendered.status, 201);
        assert_eq!(
            rendered.headers,
            [
                pair("X-Frame-Options", "DENY"),
                pair("content-type", HTML_CONTENT_TYPE)
            ]
        );
    }

    #[tokio::test]
    async fn success_json_round_trip() {
        let payload = json!({
            "name": "table",
            "rows": [[1, "a"], [2, null]],
            "nested": {"ok": true, "ratio": 0.5}
        });

        let rendered = render(Response::json(&payload).unwrap()).await;

        assert_eq!(rendered.headers, [pair("content-type", JSON_CONTENT_TYPE)]);
        let parsed: Value = serde_json::from_slice(&rendered.body).unwrap();
        assert_eq!(parsed, payload);
    }

    #[tokio::test]
    async fn success_text_stringifies() {
        let rendered = render(Response::text(42)).await;

        assert_eq!(rendered.body, "42");
        assert_eq!(rendered.headers, [pair("content-type", TEXT_CONTENT_TYPE)]);
    }

    #[tokio::test]
    async fn success_cookies_follow_headers_in_order() {
        let mut response = Response::new("").with_header("x-a", "1");
        response.set_cookie("a", "1").unwrap();
        response.set_cookie("b", "2").unwrap();

        let rendered = render(response).await;

        assert_eq!(
            rendered.headers,
            [
                pair("x-a", "1"),
                pair("content-type", "text/plain"),
                pair("set-cookie", "a=1; Path=/; SameSite=lax"),
                pair("set-cookie", "b=2; Path=/; SameSite=lax"),
            ]
        );
    }

    #[test]
    fn success_repeated_cookie_names_accumulate() {
        let mut response = Response::new("");
        response.set_cookie("a", "1").unwrap();
        response
            .set_cookie_with(
                "a",
                "",
                &CookieOptions {
                    expires: Some(Expires::Raw("Thu, 01 Jan 1970 00:00:00 GMT".to_owned())),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(response.set_cookie_headers().len(), 2);
    }

    #[test]
    fn failure_bogus_samesite_records_nothing() {
        let mut response = Response::new("");
        let options = CookieOptions {
            samesite: "bogus".to_owned(),
            ..Default::default()
        };

        let result = response.set_cookie_with("x", "1", &options);

        assert!(matches!(result, Err(AdapterError::InvalidSameSite(_))));
        assert!(response.set_cookie_headers().is_empty());
    }

    #[tokio::test]
    async fn success_redirect() {
        let response =
            Response::redirect_with("/new", StatusCode::MOVED_PERMANENTLY, [("location", "/old")]);

        let rendered = render(response).await;

        assert_eq!(rendered.status, 301);
        assert_eq!(
            rendered.headers,
            [pair("Location", "/new"), pair("content-type", "text/plain")]
        );
        assert!(rendered.body.is_empty());

        assert_eq!(render(Response::redirect("/x")).await.status, 302);
    }

    #[tokio::test]
    async fn failure_send_error_propagates() {
        let mut calls = 0;
        let mut transmit = FnTransmit(|_message: SendMessage| {
            calls += 1;
            async { Err::<(), _>(eyre::eyre!("client went away")) }
        });

        let err = Response::new("x").render(&mut transmit).await.unwrap_err();

        assert_eq!(err.to_string(), "client went away");
        drop(transmit);
        assert_eq!(calls, 1);
    }
}
