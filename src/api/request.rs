use std::borrow::Cow;
use std::collections::BTreeMap;

/// Read-only view of an inbound request, built by the protocol adapter.
///
/// Header names are stored lowercased. The mimetype is the lowercased
/// `Content-Type` essence, without parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestView {
    url: String,
    headers: BTreeMap<String, String>,
    content_length: Option<u64>,
    mimetype: Option<String>,
    args: BTreeMap<String, String>,
    body: Vec<u8>,
}

impl RequestView {
    pub fn builder(url: impl Into<String>) -> RequestViewBuilder {
        RequestViewBuilder {
            view: RequestView {
                url: url.into(),
                ..Default::default()
            },
            explicit_length: None,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn path(&self) -> &str {
        self.url.split_once('?').map(|(path, _)| path).unwrap_or(&self.url)
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    pub fn mimetype(&self) -> Option<&str> {
        self.mimetype.as_deref()
    }

    /// Query-string arguments; the last occurrence of a repeated key wins
    pub fn args(&self) -> &BTreeMap<String, String> {
        &self.args
    }

    pub fn arg(&self, name: &str) -> Option<&str> {
        self.args.get(name).map(String::as_str)
    }

    /// Raw body bytes
    pub fn data(&self) -> &[u8] {
        &self.body
    }

    /// Body decoded as UTF-8; invalid sequences are replaced
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

pub struct RequestViewBuilder {
    view: RequestView,
    explicit_length: Option<u64>,
}

impl RequestViewBuilder {
    pub fn header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.view
            .headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    /// Override the declared length instead of reading `Content-Length`
    pub fn content_length(mut self, length: u64) -> Self {
        self.explicit_length = Some(length);
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.view.body = body.into();
        self
    }

    pub fn json(self, value: &serde_json::Value) -> Self {
        self.header("content-type", "application/json")
            .body(value.to_string())
    }

    pub fn build(mut self) -> RequestView {
        let query = self
            .view
            .url
            .split_once('?')
            .map(|(_, query)| query.to_string());
        if let Some(query) = query {
            self.view.args = url::form_urlencoded::parse(query.as_bytes())
                .into_owned()
                .collect();
        }

        self.view.mimetype = self.view.headers.get("content-type").map(|value| {
            value
                .split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
        });

        self.view.content_length = self.explicit_length.or_else(|| {
            self.view
                .headers
                .get("content-length")
                .and_then(|value| value.trim().parse().ok())
                .or_else(|| (!self.view.body.is_empty()).then(|| self.view.body.len() as u64))
        });

        self.view
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_mimetype_length_and_args() {
        let view = RequestView::builder("/users?page=2&name=Jill%20Valentine&page=3")
            .header("Content-Type", "Application/JSON; charset=utf-8")
            .header("Content-Length", "17")
            .body("{\"name\": \"Jill\"}")
            .build();

        assert_eq!(view.path(), "/users");
        assert_eq!(view.mimetype(), Some("application/json"));
        assert_eq!(view.content_length(), Some(17));
        assert_eq!(view.arg("name"), Some("Jill Valentine"));
        assert_eq!(view.arg("page"), Some("3"));
        assert_eq!(view.header("CONTENT-TYPE"), Some("Application/JSON; charset=utf-8"));
        assert_eq!(view.text(), "{\"name\": \"Jill\"}");
    }

    #[test]
    fn explicit_length_wins() {
        let view = RequestView::builder("/")
            .header("content-length", "5")
            .content_length(9000)
            .build();
        assert_eq!(view.content_length(), Some(9000));
        assert_eq!(view.mimetype(), None);
        assert!(view.args().is_empty());
    }

    #[test]
    fn length_falls_back_to_the_body() {
        let view = RequestView::builder("/").body("abc").build();
        assert_eq!(view.content_length(), Some(3));
        assert_eq!(RequestView::builder("/").build().content_length(), None);
    }
}
