/// Shared system config: one document, one boolean that matters
///
/// The adapter keeps the last known [`SystemConfig`] in a `watch` channel.
/// It starts enabled and only changes when the remote document says so;
/// listener errors are logged and the last value stands (fail-open).
///
/// Reads are pushed over Firestore's bidirectional `Listen` gRPC call, the
/// same channel the web SDK uses. Writes are a REST `PATCH` with an update
/// mask and are admin-only: the check happens before anything is sent, so
/// a non-admin gets [`ConfigWriteError::PermissionDenied`] synchronously.
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use futures_util::stream::{self, BoxStream};
use futures_util::{Stream, StreamExt};
use gcloud_sdk::google::firestore::v1::firestore_client::FirestoreClient;
use gcloud_sdk::google::firestore::v1::listen_response::ResponseType;
use gcloud_sdk::google::firestore::v1::target::{DocumentsTarget, TargetType};
use gcloud_sdk::google::firestore::v1::target_change::TargetChangeType;
use gcloud_sdk::google::firestore::v1::value::ValueType;
use gcloud_sdk::google::firestore::v1::{
    listen_request, Document, ListenRequest, ListenResponse, Target,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tonic::metadata::MetadataValue;
use tonic::transport::{ClientTlsConfig, Endpoint};
use tonic::{Request, Streaming};
use tracing::{debug, info, warn};

use crate::config::FirebaseConfig;
use crate::error::{ConfigReadError, ConfigWriteError};
use crate::services::auth::{Identity, Session, SessionSource};
use crate::state::data::SystemConfig;

/// Target id used for the single listen target.
const LISTEN_TARGET_ID: i32 = 1;

/// Pause before a listener whose stream ended subscribes again.
pub const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(3);

/// Something that happened to the config document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigEvent {
    /// The document exists with this content.
    Changed(SystemConfig),
    /// The document was deleted or left the target.
    Removed,
}

/// Remote listener output.
pub type ConfigFeed = BoxStream<'static, Result<ConfigEvent, ConfigReadError>>;

/// Fields merged into the document by an admin toggle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigUpdate {
    pub api_enabled: bool,
    /// RFC 3339, UTC, millisecond precision.
    pub last_updated: String,
    pub updated_by: String,
}

/// Document store operations for the config record.
#[async_trait]
pub trait ConfigBackend: Send + Sync {
    /// Lazily-started push feed of document changes for `session`.
    fn listen(&self, session: &Session) -> ConfigFeed;

    /// Merge `update` into the document.
    async fn merge(&self, session: &Session, update: &ConfigUpdate) -> Result<(), ConfigWriteError>;
}

fn field<'a>(document: &'a Document, name: &str) -> Option<&'a ValueType> {
    document.fields.get(name)?.value_type.as_ref()
}

fn text_field(document: &Document, name: &str) -> Option<String> {
    match field(document, name)? {
        ValueType::StringValue(s) => Some(s.clone()),
        ValueType::TimestampValue(ts) => DateTime::<Utc>::from_timestamp(ts.seconds, ts.nanos.max(0) as u32)
            .map(|at| at.to_rfc3339_opts(SecondsFormat::Millis, true)),
        _ => None,
    }
}

/// Read a `SystemConfig` out of a Firestore document. A missing
/// `apiEnabled` reads as enabled.
fn config_from_document(document: &Document) -> SystemConfig {
    let api_enabled = match field(document, "apiEnabled") {
        Some(ValueType::BooleanValue(enabled)) => *enabled,
        _ => true,
    };
    SystemConfig {
        api_enabled,
        last_updated: text_field(document, "lastUpdated"),
        updated_by: text_field(document, "updatedBy"),
    }
}

/// Decode one `ListenResponse`.
///
/// Responses that say nothing about the document (target adds, filters,
/// heartbeats) decode to `None`. A target removal carrying a cause is the
/// server ending the listen, e.g. on a rules denial, and is an error.
pub fn decode_listen_response(response: ListenResponse) -> Result<Option<ConfigEvent>, ConfigReadError> {
    match response.response_type {
        Some(ResponseType::DocumentChange(change)) => {
            Ok(change.document.map(|document| ConfigEvent::Changed(config_from_document(&document))))
        }
        Some(ResponseType::DocumentDelete(_)) | Some(ResponseType::DocumentRemove(_)) => {
            Ok(Some(ConfigEvent::Removed))
        }
        Some(ResponseType::TargetChange(change))
            if change.target_change_type == TargetChangeType::Remove as i32 =>
        {
            let (code, detail) = change
                .cause
                .map(|cause| (tonic::Code::from(cause.code), cause.message))
                .unwrap_or((tonic::Code::Unknown, "listen target removed".to_string()));
            Err(ConfigReadError::Rejected {
                code: format!("{code:?}"),
                detail,
            })
        }
        _ => Ok(None),
    }
}

fn status_error(status: &tonic::Status) -> ConfigReadError {
    match status.code() {
        tonic::Code::Unavailable | tonic::Code::DeadlineExceeded | tonic::Code::Cancelled => {
            ConfigReadError::Transport(status.message().to_string())
        }
        code => ConfigReadError::Rejected {
            code: format!("{code:?}"),
            detail: status.message().to_string(),
        },
    }
}

/// The add-target request for one document.
fn listen_request(database: &str, document: &str) -> ListenRequest {
    ListenRequest {
        database: database.to_string(),
        target_change: Some(listen_request::TargetChange::AddTarget(Target {
            target_id: LISTEN_TARGET_ID,
            target_type: Some(TargetType::Documents(DocumentsTarget {
                documents: vec![document.to_string()],
            })),
            ..Default::default()
        })),
        ..Default::default()
    }
}

/// Connect and start a `Listen` call. The outbound half sends the target
/// once and then stays open for as long as the call runs.
async fn open_listen(
    url: String,
    database: String,
    token: Option<String>,
    target: ListenRequest,
) -> Result<Streaming<ListenResponse>, ConfigReadError> {
    let transport = |e: tonic::transport::Error| ConfigReadError::Transport(e.to_string());
    let invalid = |e: tonic::metadata::errors::InvalidMetadataValue| ConfigReadError::Transport(e.to_string());

    let mut endpoint = Endpoint::from_shared(url).map_err(transport)?;
    if endpoint.uri().scheme_str() == Some("https") {
        endpoint = endpoint
            .tls_config(ClientTlsConfig::new().with_enabled_roots())
            .map_err(transport)?;
    }
    let channel = endpoint.connect().await.map_err(transport)?;

    let outbound = stream::once(async move { target }).chain(stream::pending());
    let mut request = Request::new(outbound);
    let metadata = request.metadata_mut();
    metadata.insert(
        "google-cloud-resource-prefix",
        MetadataValue::try_from(database.as_str()).map_err(invalid)?,
    );
    metadata.insert(
        "x-goog-request-params",
        format!("database={database}").parse().map_err(invalid)?,
    );
    if let Some(token) = token {
        metadata.insert("authorization", format!("Bearer {token}").parse().map_err(invalid)?);
    }

    let response = FirestoreClient::new(channel)
        .listen(request)
        .await
        .map_err(|status| status_error(&status))?;
    Ok(response.into_inner())
}

/// `ConfigBackend` backed by Firestore: gRPC `Listen` for reads, REST for
/// writes.
pub struct FirestoreBackend {
    api_key: String,
    base_url: String,
    project_id: String,
    document_path: String,
    client: reqwest::Client,
}

impl FirestoreBackend {
    pub fn new(config: &FirebaseConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            base_url: config.firestore_base_url.trim_end_matches('/').to_string(),
            project_id: config.project_id.clone(),
            document_path: format!(
                "artifacts/{}/public/data/system_settings/global_config",
                config.app_id
            ),
            client: reqwest::Client::new(),
        }
    }

    fn database(&self) -> String {
        format!("projects/{}/databases/(default)", self.project_id)
    }

    /// Full resource name of the config document.
    pub fn document_name(&self) -> String {
        format!("{}/documents/{}", self.database(), self.document_path)
    }
}

#[async_trait]
impl ConfigBackend for FirestoreBackend {
    fn listen(&self, session: &Session) -> ConfigFeed {
        let url = self.base_url.clone();
        let database = self.database();
        let target = listen_request(&database, &self.document_name());
        let token = session.id_token.clone();

        Box::pin(async_stream::stream! {
            let mut inbound = match open_listen(url, database, token, target).await {
                Ok(inbound) => inbound,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            debug!("config listen stream open");
            loop {
                match inbound.message().await {
                    Ok(Some(response)) => match decode_listen_response(response) {
                        Ok(Some(event)) => yield Ok(event),
                        Ok(None) => {}
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    },
                    Ok(None) => break,
                    Err(status) => {
                        yield Err(status_error(&status));
                        return;
                    }
                }
            }
            debug!("config listen stream closed by server");
        })
    }

    async fn merge(&self, session: &Session, update: &ConfigUpdate) -> Result<(), ConfigWriteError> {
        let url = format!("{}/v1/{}", self.base_url, self.document_name());
        let body = serde_json::json!({
            "fields": {
                "apiEnabled": { "booleanValue": update.api_enabled },
                "lastUpdated": { "stringValue": update.last_updated },
                "updatedBy": { "stringValue": update.updated_by },
            }
        });

        let mut request = self
            .client
            .patch(&url)
            .query(&[
                ("updateMask.fieldPaths", "apiEnabled"),
                ("updateMask.fieldPaths", "lastUpdated"),
                ("updateMask.fieldPaths", "updatedBy"),
                ("key", self.api_key.as_str()),
            ])
            .json(&body);
        if let Some(token) = &session.id_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ConfigWriteError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ConfigWriteError::Rejected {
                status: status.as_u16(),
                detail: detail.chars().take(500).collect(),
            });
        }
        Ok(())
    }
}


/// Last known config plus the listener and write paths around it.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct ConfigStoreAdapter {
    backend: Arc<dyn ConfigBackend>,
    current: Arc<watch::Sender<SystemConfig>>,
}

impl ConfigStoreAdapter {
    pub fn new(backend: Arc<dyn ConfigBackend>) -> Self {
        let (current, _) = watch::channel(SystemConfig::default());
        Self {
            backend,
            current: Arc::new(current),
        }
    }

    /// Last known value.
    pub fn current(&self) -> SystemConfig {
        self.current.borrow().clone()
    }

    /// Live view of the config. Starts at the current value.
    pub fn observe(&self) -> watch::Receiver<SystemConfig> {
        self.current.subscribe()
    }

    /// The listener for `session` as a lazy stream. Every accepted change is
    /// published to observers and yielded; errors and deletions are not.
    pub fn follow(&self, session: &Session) -> impl Stream<Item = SystemConfig> + Send + 'static {
        let current = self.current.clone();
        self.backend.listen(session).filter_map(move |event| {
            let current = current.clone();
            async move {
                match event {
                    Ok(ConfigEvent::Changed(config)) => {
                        current.send_replace(config.clone());
                        Some(config)
                    }
                    Ok(ConfigEvent::Removed) => {
                        debug!("config document removed, keeping last value");
                        None
                    }
                    Err(e) => {
                        warn!(error = %e, "config listener error, keeping last value");
                        None
                    }
                }
            }
        })
    }

    /// Run the listener in the background until the handle is stopped or
    /// dropped.
    ///
    /// Each subscription takes a fresh session from `sessions`, so a stream
    /// the server closed for an expired token comes back with a new one
    /// after [`RESUBSCRIBE_DELAY`]. The listener stops by itself once
    /// `sessions` hands out a different user or no token at all.
    pub fn attach(&self, sessions: Arc<dyn SessionSource>) -> ListenerHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let adapter = self.clone();

        let task = tokio::spawn(async move {
            let mut owner: Option<String> = None;
            'listen: loop {
                let session = tokio::select! {
                    _ = token.cancelled() => break 'listen,
                    session = sessions.session() => session,
                };

                match session {
                    Ok(session) if session.id_token.is_none() => {
                        debug!("no credentials, config listener stopped");
                        break 'listen;
                    }
                    Ok(session) => {
                        let uid = owner.get_or_insert_with(|| session.local_id.clone()).clone();
                        if uid != session.local_id {
                            debug!(uid = %uid, "identity changed, config listener stopped");
                            break 'listen;
                        }

                        debug!(uid = %uid, "config listener started");
                        let stream = adapter.follow(&session);
                        tokio::pin!(stream);
                        loop {
                            tokio::select! {
                                _ = token.cancelled() => {
                                    debug!(uid = %uid, "config listener cancelled");
                                    break 'listen;
                                }
                                next = stream.next() => match next {
                                    Some(config) => info!(api_enabled = config.api_enabled, "⚙️  system config updated"),
                                    None => break,
                                }
                            }
                        }
                        warn!(uid = %uid, "config listener ended, resubscribing");
                    }
                    Err(e) => warn!(error = %e, "no session for config listener"),
                }

                tokio::select! {
                    _ = token.cancelled() => break 'listen,
                    _ = tokio::time::sleep(RESUBSCRIBE_DELAY) => {}
                }
            }
        });

        ListenerHandle { cancel, task }
    }

    /// Prepare an admin write of the flag.
    ///
    /// Non-admins are refused here, before any request exists.
    pub fn set_enabled(
        &self,
        identity: &Identity,
        enabled: bool,
    ) -> Result<PendingWrite, ConfigWriteError> {
        let Identity::Admin(session) = identity else {
            warn!("config write refused for non-admin session");
            return Err(ConfigWriteError::PermissionDenied);
        };

        let update = ConfigUpdate {
            api_enabled: enabled,
            last_updated: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            updated_by: session
                .email
                .clone()
                .unwrap_or_else(|| "Admin".to_string()),
        };

        Ok(PendingWrite {
            backend: self.backend.clone(),
            uid: session.local_id.clone(),
            update,
        })
    }
}

/// A running config listener. Stops when dropped.
#[derive(Debug)]
pub struct ListenerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    /// Cancel the listener and wait for its task to finish.
    #[cfg(test)]
    pub async fn stop(mut self) {
        self.cancel.cancel();
        let _ = (&mut self.task).await;
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Holds the one listener the shell runs, keyed by user and role.
///
/// Identity updates that only carry a refreshed token keep the running
/// listener. Attaching is async, so every attach gets a generation and a
/// handle that arrives after a newer identity is dropped, which cancels it.
#[derive(Debug, Default)]
pub struct ListenerSlot {
    key: Option<(String, bool)>,
    generation: u64,
    handle: Option<Arc<ListenerHandle>>,
}

impl ListenerSlot {
    /// Note the current identity. Returns the generation to attach a new
    /// listener for, or `None` when nothing needs to start.
    pub fn retarget(&mut self, identity: &Identity) -> Option<u64> {
        let key = identity
            .has_credentials()
            .then(|| (identity.session().local_id.clone(), identity.is_admin()));
        if key == self.key {
            return None;
        }

        self.key = key;
        self.generation += 1;
        if self.handle.take().is_some() {
            debug!(generation = self.generation, "config listener detached");
        }
        self.key.is_some().then_some(self.generation)
    }

    /// Keep `handle` if it belongs to the latest generation.
    pub fn install(&mut self, generation: u64, handle: Arc<ListenerHandle>) -> bool {
        if generation != self.generation || self.key.is_none() {
            debug!(generation, current = self.generation, "stale config listener dropped");
            return false;
        }
        self.handle = Some(handle);
        true
    }

    #[cfg(test)]
    pub fn is_listening(&self) -> bool {
        self.handle.is_some()
    }
}

/// An authorised, not yet sent, config write.
pub struct PendingWrite {
    backend: Arc<dyn ConfigBackend>,
    uid: String,
    update: ConfigUpdate,
}

impl PendingWrite {
    #[cfg(test)]
    pub fn update(&self) -> &ConfigUpdate {
        &self.update
    }

    /// Send with a token from `sessions`. The write is refused if the
    /// admin who authorised it is no longer the signed-in user.
    pub async fn send(self, sessions: &dyn SessionSource) -> Result<(), ConfigWriteError> {
        let session = sessions
            .session()
            .await
            .map_err(|e| ConfigWriteError::Transport(e.to_string()))?;
        if session.local_id != self.uid || session.is_anonymous {
            warn!("config write dropped, admin session ended before it was sent");
            return Err(ConfigWriteError::PermissionDenied);
        }

        let result = self.backend.merge(&session, &self.update).await;
        match &result {
            Ok(()) => info!(
                api_enabled = self.update.api_enabled,
                by = %self.update.updated_by,
                "system config written"
            ),
            Err(e) => warn!(error = %e, "system config write failed"),
        }
        result
    }
}
