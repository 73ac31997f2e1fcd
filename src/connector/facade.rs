use std::fmt;
use std::sync::Arc;

use crate::config::{Config, ConnectionData, SessionContext};
use crate::error::{Error, Result};
use crate::github::{GitHubClient, HttpTransport, RateLimitState};
use crate::models::{Record, Schema, TableRequest, TableSet};
use crate::normalize::DataType;
use crate::schema::SchemaProvider;

use super::sink::TableSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorState {
    Created,
    Initialized,
    SchemaReady,
    Idle,
    FetchingTable,
    ShuttingDown,
    Terminated,
}

impl fmt::Display for ConnectorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectorState::Created => "created",
            ConnectorState::Initialized => "initialized",
            ConnectorState::SchemaReady => "schema-ready",
            ConnectorState::Idle => "idle",
            ConnectorState::FetchingTable => "fetching",
            ConnectorState::ShuttingDown => "shutting down",
            ConnectorState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// One host session: credential check, schema, and cached table data.
///
/// Tables are fetched at most once per session. Fetching one table fills the
/// cache with every related table the same normalization pass emits.
pub struct Connector {
    github: GitHubClient,
    schemas: SchemaProvider,
    context: SessionContext,
    state: ConnectorState,
    schema: Option<Arc<Schema>>,
    cache: TableSet,
}

impl Connector {
    /// A connector authenticating as `context.credential`.
    ///
    /// `config` supplies the API base, concurrency limit and schema source;
    /// its own credential is not consulted.
    pub fn new(config: &Config, context: SessionContext) -> Result<Self> {
        let transport = HttpTransport::new(&context.credential)?;
        let github = GitHubClient::with_transport(Arc::new(transport), config.api_url.clone())
            .with_concurrency_limit(config.concurrency_limit);

        Ok(Self::assemble(github, SchemaProvider::from_config(config), context))
    }

    pub fn from_config(config: &Config, connection: ConnectionData) -> Result<Self> {
        Self::new(
            config,
            SessionContext::new(config.credential.clone(), connection),
        )
    }

    #[cfg(test)]
    pub(crate) fn with_transport(
        transport: Arc<dyn crate::github::Transport>,
        base_url: &str,
        context: SessionContext,
    ) -> Self {
        Self::assemble(
            GitHubClient::with_transport(transport, base_url),
            SchemaProvider::embedded(),
            context,
        )
    }

    fn assemble(github: GitHubClient, schemas: SchemaProvider, context: SessionContext) -> Self {
        Self {
            github,
            schemas,
            context,
            state: ConnectorState::Created,
            schema: None,
            cache: TableSet::new(),
        }
    }

    pub fn state(&self) -> ConnectorState {
        self.state
    }

    pub fn data_type(&self) -> DataType {
        self.context.connection.data_type
    }

    /// Validate the credential with a `GET /rate_limit` request.
    pub async fn init(&mut self) -> Result<RateLimitState> {
        self.require("initialize", &[ConnectorState::Created])?;

        if self.context.credential.is_anonymous() {
            return Err(Error::Auth("no GitHub credential configured".to_string()));
        }

        let rate_limit = self.github.get_rate_limit().await?;
        tracing::info!(
            "Connected to GitHub ({} of {} requests remaining)",
            rate_limit.remaining.unwrap_or_default(),
            rate_limit.limit.unwrap_or_default()
        );

        self.state = ConnectorState::Initialized;
        Ok(rate_limit)
    }

    /// The composed schema of the active data type, loaded once per session.
    pub async fn get_schema(&mut self) -> Result<Arc<Schema>> {
        self.require(
            "get schema",
            &[
                ConnectorState::Initialized,
                ConnectorState::SchemaReady,
                ConnectorState::Idle,
            ],
        )?;

        let schema = self.load_schema().await?;
        if self.state == ConnectorState::Initialized {
            self.state = ConnectorState::SchemaReady;
        }
        Ok(schema)
    }

    /// Hand the rows of the requested table to `sink`.
    ///
    /// Served from the session cache when present. Otherwise the table is
    /// fetched and normalized first; a failed fetch leaves the cache untouched.
    /// Returns the number of rows registered.
    pub async fn get_data(
        &mut self,
        request: &TableRequest,
        sink: &mut dyn TableSink,
    ) -> Result<usize> {
        self.require(
            "get data",
            &[
                ConnectorState::Initialized,
                ConnectorState::SchemaReady,
                ConnectorState::Idle,
            ],
        )?;

        let schema = self.load_schema().await?;
        let table_id = request.table_id.as_str();
        let descriptor = schema
            .table(table_id)
            .ok_or_else(|| Error::UnknownTable(table_id.to_string()))?;

        self.state = ConnectorState::FetchingTable;
        let populated = self.populate(request).await;
        self.state = ConnectorState::Idle;
        populated?;

        let rows: Vec<Record> = self
            .cache
            .rows(table_id)
            .unwrap_or_default()
            .iter()
            .map(|row| descriptor.project(row))
            .collect();
        let count = rows.len();

        sink.register_headers(table_id, descriptor.headers());
        sink.register_rows(table_id, rows);

        tracing::info!("Registered {} rows for {}", count, table_id);
        Ok(count)
    }

    /// Rows cached for `table_id`, as normalized and before projection.
    pub fn cached_rows(&self, table_id: &str) -> Option<&[Record]> {
        self.cache.rows(table_id)
    }

    /// End the session, discarding the cache and schema.
    pub fn shutdown(&mut self) {
        self.state = ConnectorState::ShuttingDown;
        self.cache = TableSet::new();
        self.schema = None;
        self.state = ConnectorState::Terminated;
        tracing::info!("Connector shut down");
    }

    async fn populate(&mut self, request: &TableRequest) -> Result<()> {
        let table_id = request.table_id.as_str();
        if self.cache.contains(table_id) {
            tracing::debug!("Serving {} from cache", table_id);
            return Ok(());
        }

        let data_type = self.context.connection.data_type;
        let urls = data_type.request_urls(
            self.github.base_url(),
            &self.context.connection.query,
            table_id,
        )?;
        let options = self.context.connection.fetch_options();

        tracing::info!("Fetching {} for {} from {} URL(s)", data_type, table_id, urls.len());
        let raw = self.github.fetch_many(&urls, &options).await?;

        data_type.normalize(&mut self.cache, request, raw);
        Ok(())
    }

    async fn load_schema(&mut self) -> Result<Arc<Schema>> {
        if let Some(ref schema) = self.schema {
            return Ok(schema.clone());
        }

        let schema = Arc::new(self.schemas.schema_for(self.data_type()).await?);
        self.schema = Some(schema.clone());
        Ok(schema)
    }

    fn require(&self, operation: &'static str, allowed: &[ConnectorState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(Error::InvalidState {
                operation,
                state: self.state.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credential;
    use crate::connector::RowBuffer;
    use crate::github::testing::FakeTransport;
    use mockito::Server;
    use serde_json::{json, Value};

    const BASE: &str = "https://api.test";

    fn rate_limit_body() -> Value {
        json!({"resources": {"core": {"limit": 5000, "remaining": 4999, "reset": 1700000000}}})
    }

    fn issues_transport() -> FakeTransport {
        FakeTransport::new()
            .json(&format!("{}/rate_limit", BASE), rate_limit_body())
            .json(
                &format!("{}/repos/acme/a/issues", BASE),
                json!([{
                    "id": 1,
                    "number": 7,
                    "title": "Crash on start",
                    "state": "open",
                    "repository_url": "https://api.test/repos/acme/a",
                    "user": {"id": 10, "login": "octo"},
                    "assignees": [{"id": 10, "login": "octo"}, {"id": 11, "login": "cat"}],
                    "labels": [{"id": 100, "name": "bug"}],
                    "comments": 2,
                    "comments_url": "https://api.test/repos/acme/a/issues/7/comments"
                }]),
            )
            .json(
                &format!("{}/repos/acme/b/issues", BASE),
                json!([{
                    "id": 2,
                    "number": 3,
                    "title": "Add docs",
                    "state": "closed",
                    "repository_url": "https://api.test/repos/acme/b",
                    "user": {"id": 11, "login": "cat"},
                    "labels": [{"id": 100, "name": "bug"}],
                    "pull_request": {"url": "https://api.test/repos/acme/b/pulls/3"}
                }]),
            )
    }

    fn connector(transport: Arc<FakeTransport>, connection: ConnectionData) -> Connector {
        Connector::with_transport(
            transport,
            BASE,
            SessionContext::new(Credential::Token("secret".to_string()), connection),
        )
    }

    #[tokio::test]
    async fn test_lifecycle_states() {
        let transport = Arc::new(issues_transport());
        let mut connector = connector(
            transport,
            ConnectionData::new(DataType::Issues, "repos/acme/[a,b]/issues"),
        );
        assert_eq!(connector.state(), ConnectorState::Created);

        let err = connector.get_schema().await.unwrap_err();
        assert!(matches!(err, Error::InvalidState { .. }));

        connector.init().await.unwrap();
        assert_eq!(connector.state(), ConnectorState::Initialized);

        let schema = connector.get_schema().await.unwrap();
        assert_eq!(schema.tables.len(), 7);
        assert_eq!(connector.state(), ConnectorState::SchemaReady);

        let mut sink = RowBuffer::new();
        connector.get_data(&TableRequest::new("issues"), &mut sink).await.unwrap();
        assert_eq!(connector.state(), ConnectorState::Idle);

        connector.shutdown();
        assert_eq!(connector.state(), ConnectorState::Terminated);
        assert!(connector.cached_rows("issues").is_none());

        let err = connector
            .get_data(&TableRequest::new("issues"), &mut sink)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidState { .. }));
    }

    #[tokio::test]
    async fn test_repeated_requests_fetch_once() {
        let transport = Arc::new(issues_transport());
        let mut connector = connector(
            transport.clone(),
            ConnectionData::new(DataType::Issues, "repos/acme/[a,b]/issues"),
        );
        connector.init().await.unwrap();

        let mut first = RowBuffer::new();
        let mut second = RowBuffer::new();
        connector.get_data(&TableRequest::new("users"), &mut first).await.unwrap();
        let calls = transport.calls();
        connector.get_data(&TableRequest::new("users"), &mut second).await.unwrap();

        // rate limit check plus one request per repository
        assert_eq!(calls, 3);
        assert_eq!(transport.calls(), calls);

        let mut first_rows = first.table("users").unwrap().rows.clone();
        let mut second_rows = second.table("users").unwrap().rows.clone();
        first_rows.sort_by_key(|r| r["id"].as_i64());
        second_rows.sort_by_key(|r| r["id"].as_i64());
        assert_eq!(first_rows, second_rows);
        assert_eq!(first_rows.len(), 2);
    }

    #[tokio::test]
    async fn test_related_tables_come_from_cache() {
        let transport = Arc::new(issues_transport());
        let mut connector = connector(
            transport.clone(),
            ConnectionData::new(DataType::Issues, "repos/acme/[a,b]/issues"),
        );
        connector.init().await.unwrap();

        let mut sink = RowBuffer::new();
        let issues = connector.get_data(&TableRequest::new("issues"), &mut sink).await.unwrap();
        assert_eq!(issues, 2);
        let calls = transport.calls();

        for table in ["users", "milestones", "assignees", "labels", "assigned_labels", "comments"] {
            connector.get_data(&TableRequest::new(table), &mut sink).await.unwrap();
        }
        assert_eq!(transport.calls(), calls);

        assert_eq!(sink.table("assignees").unwrap().rows.len(), 2);
        assert_eq!(sink.table("labels").unwrap().rows.len(), 1);
        assert_eq!(sink.table("assigned_labels").unwrap().rows.len(), 2);
        assert_eq!(sink.table("comments").unwrap().rows.len(), 1);
        assert!(sink.table("milestones").unwrap().rows.is_empty());

        let issue = sink
            .table("issues")
            .unwrap()
            .rows
            .iter()
            .find(|r| r["id"] == 2)
            .unwrap();
        assert_eq!(issue["repo_name"], "acme/b");
        assert_eq!(issue["is_pull_request"], true);
        assert_eq!(issue["user_id"], 11);

        // headers follow the descriptor, rows are projected onto it
        let users = sink.table("users").unwrap();
        assert_eq!(users.headers[0].name, "id");
        assert_eq!(users.rows[0].len(), users.headers.len());
    }

    #[tokio::test]
    async fn test_failed_fetch_commits_nothing() {
        let transport = Arc::new(
            FakeTransport::new()
                .json(&format!("{}/rate_limit", BASE), rate_limit_body())
                .json(&format!("{}/repos/acme/a/issues", BASE), json!([{"id": 1}]))
                .page(
                    &format!("{}/repos/acme/b/issues", BASE),
                    502,
                    json!({"message": "Bad Gateway"}),
                    None,
                ),
        );
        let mut connector = connector(
            transport,
            ConnectionData::new(DataType::Issues, "repos/acme/[a,b]/issues"),
        );
        connector.init().await.unwrap();

        let mut sink = RowBuffer::new();
        let err = connector
            .get_data(&TableRequest::new("issues"), &mut sink)
            .await
            .unwrap_err();

        assert!(err.url().unwrap().contains("/repos/acme/b/issues"));
        assert!(connector.cached_rows("issues").is_none());
        assert!(sink.table("issues").is_none());
        assert_eq!(connector.state(), ConnectorState::Idle);
    }

    #[tokio::test]
    async fn test_init_rejects_bad_credential() {
        let transport = Arc::new(FakeTransport::new().page(
            &format!("{}/rate_limit", BASE),
            401,
            json!({"message": "Bad credentials"}),
            None,
        ));
        let mut connector = connector(
            transport,
            ConnectionData::new(DataType::Pulls, "repos/acme/a/pulls"),
        );

        let err = connector.init().await.unwrap_err();
        assert!(err.is_auth());
        assert_eq!(connector.state(), ConnectorState::Created);
    }

    #[tokio::test]
    async fn test_init_requires_credential() {
        let transport = Arc::new(FakeTransport::new());
        let mut connector = Connector::with_transport(
            transport.clone(),
            BASE,
            SessionContext::new(
                Credential::Anonymous,
                ConnectionData::new(DataType::Pulls, "repos/acme/a/pulls"),
            ),
        );

        assert!(connector.init().await.unwrap_err().is_auth());
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_requests_use_session_credential() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/rate_limit")
            .match_header("authorization", "Bearer session-token")
            .with_status(200)
            .with_body(rate_limit_body().to_string())
            .create_async()
            .await;

        let config = Config {
            credential: Credential::Token("other-token".to_string()),
            api_url: server.url(),
            concurrency_limit: 2,
            schema_dir: None,
        };
        let context = SessionContext::new(
            Credential::Token("session-token".to_string()),
            ConnectionData::new(DataType::Pulls, "repos/acme/a/pulls"),
        );

        let mut connector = Connector::new(&config, context).unwrap();
        let rate_limit = connector.init().await.unwrap();
        assert_eq!(rate_limit.remaining, Some(4999));
    }

    #[tokio::test]
    async fn test_unknown_table() {
        let transport = Arc::new(issues_transport());
        let mut connector = connector(
            transport,
            ConnectionData::new(DataType::Issues, "repos/acme/a/issues"),
        );
        connector.init().await.unwrap();

        let err = connector
            .get_data(&TableRequest::new("traffic_views"), &mut RowBuffer::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownTable(ref t) if t == "traffic_views"));
    }

    #[tokio::test]
    async fn test_traffic_incremental_refresh() {
        let transport = Arc::new(
            FakeTransport::new()
                .json(&format!("{}/rate_limit", BASE), rate_limit_body())
                .json(
                    &format!("{}/repos/acme/x/traffic/views", BASE),
                    json!({
                        "count": 9,
                        "uniques": 4,
                        "views": [
                            {"timestamp": "2024-01-01T00:00:00Z", "count": 2, "uniques": 1},
                            {"timestamp": "2024-01-02T00:00:00Z", "count": 3, "uniques": 1},
                            {"timestamp": "2024-01-03T00:00:00Z", "count": 4, "uniques": 2}
                        ]
                    }),
                ),
        );
        let mut connector = connector(
            transport.clone(),
            ConnectionData::new(DataType::Traffic, "repos/acme/x/traffic"),
        );
        connector.init().await.unwrap();

        let mut sink = RowBuffer::new();
        let request =
            TableRequest::incremental("traffic_views", "timestamp", "2024-01-02T00:00:00Z");
        let count = connector.get_data(&request, &mut sink).await.unwrap();

        assert_eq!(count, 1);
        let row = &sink.table("traffic_views").unwrap().rows[0];
        assert_eq!(row["timestamp"], "2024-01-03T00:00:00Z");
        assert_eq!(row["repo_name"], "acme/x");
        assert!(transport
            .requested()
            .iter()
            .any(|url| url.starts_with("https://api.test/repos/acme/x/traffic/views")));
    }
}
