use anyhow::Result;
use async_trait::async_trait;

use crate::http::HttpClient;
use crate::script::ScriptSource;

/// A remote build-script endpoint answering `GET <url>?arg=<a>&arg=<b>...`
/// with an arbitrary JSON document.
pub struct HttpScriptSource {
    http_client: HttpClient,
    url: String,
}

impl HttpScriptSource {
    pub fn new(http_client: HttpClient, url: impl Into<String>) -> Self {
        Self {
            http_client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl ScriptSource for HttpScriptSource {
    #[tracing::instrument(skip(self))]
    async fn build(&self, args: &[String]) -> Result<serde_json::Value> {
        let query: Vec<(&str, &str)> = args.iter().map(|arg| ("arg", arg.as_str())).collect();
        self.http_client.get_json_with_query(&self.url, &query).await
    }
}
