use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use tracing::debug;

use crate::dao::{
    models::SessionEntity,
    room_store::RoomStore,
    storage::{StorageResult, ensure_record_key},
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{CouchRoomDocument, RevisionOnly, room_doc_id},
};

/// Room store backed by one CouchDB document per room.
#[derive(Clone)]
pub struct CouchRoomStore {
    client: Client,
    database_url: Arc<str>,
    credentials: Option<Arc<(String, String)>>,
}

impl CouchRoomStore {
    /// Connect and create the database when it does not exist yet.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let store = Self::new(config)?;
        store.ensure_database().await?;
        Ok(store)
    }

    fn new(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;
        Ok(Self {
            client,
            database_url: format!("{}/{}", config.base_url, config.database).into(),
            credentials: config.credentials.map(Arc::new),
        })
    }

    fn request(&self, method: Method, doc_id: Option<&str>) -> RequestBuilder {
        let url = match doc_id {
            Some(doc_id) => format!("{}/{doc_id}", self.database_url),
            None => self.database_url.to_string(),
        };
        let builder = self.client.request(method, url);
        match self.credentials.as_deref() {
            Some((user, pass)) => builder.basic_auth(user, Some(pass)),
            None => builder,
        }
    }

    async fn send(&self, path: &str, builder: RequestBuilder) -> CouchResult<Response> {
        builder.send().await.map_err(|source| CouchDaoError::Transport {
            path: path.to_string(),
            source,
        })
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let path = self.database_url.to_string();
        let status = self.send(&path, self.request(Method::GET, None)).await?.status();
        if status == StatusCode::NOT_FOUND {
            let created = self.send(&path, self.request(Method::PUT, None)).await?.status();
            // 412: someone else created it in between.
            if created.is_success() || created == StatusCode::PRECONDITION_FAILED {
                debug!(database = %path, "room database created");
                return Ok(());
            }
            return Err(CouchDaoError::Status {
                path,
                status: created,
            });
        }
        if status.is_success() {
            Ok(())
        } else {
            Err(CouchDaoError::Status { path, status })
        }
    }

    async fn get_document<T>(&self, doc_id: &str) -> CouchResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let response = self
            .send(doc_id, self.request(Method::GET, Some(doc_id)))
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let body = response
                    .bytes()
                    .await
                    .map_err(|source| CouchDaoError::Transport {
                        path: doc_id.to_string(),
                        source,
                    })?;
                serde_json::from_slice(&body)
                    .map(Some)
                    .map_err(|source| CouchDaoError::Decode {
                        path: doc_id.to_string(),
                        source,
                    })
            }
            status => Err(CouchDaoError::Status {
                path: doc_id.to_string(),
                status,
            }),
        }
    }

    /// PUT a document; a revision conflict is returned as a status, not an error.
    async fn put_document<T>(&self, doc_id: &str, document: &T) -> CouchResult<StatusCode>
    where
        T: ?Sized + Serialize,
    {
        let status = self
            .send(doc_id, self.request(Method::PUT, Some(doc_id)).json(document))
            .await?
            .status();
        if status.is_success() || status == StatusCode::CONFLICT {
            Ok(status)
        } else {
            Err(CouchDaoError::Status {
                path: doc_id.to_string(),
                status,
            })
        }
    }

    async fn current_rev(&self, doc_id: &str) -> CouchResult<Option<String>> {
        Ok(self
            .get_document::<RevisionOnly>(doc_id)
            .await?
            .map(|doc| doc.rev))
    }

    /// Last write wins: a write that lost the revision race is replayed once
    /// on top of the fresh revision.
    async fn overwrite(&self, session_id: &str, record: SessionEntity) -> CouchResult<()> {
        let doc_id = room_doc_id(session_id);
        let rev = self.current_rev(&doc_id).await?;
        let mut doc = CouchRoomDocument::new(doc_id.clone(), record, rev);

        if self.put_document(&doc_id, &doc).await? == StatusCode::CONFLICT {
            debug!(doc_id = %doc_id, "room write conflicted; replaying on fresh revision");
            doc.rev = self.current_rev(&doc_id).await?;
            let status = self.put_document(&doc_id, &doc).await?;
            if status == StatusCode::CONFLICT {
                return Err(CouchDaoError::Status {
                    path: doc_id,
                    status,
                });
            }
        }
        Ok(())
    }

    async fn remove(&self, session_id: &str) -> CouchResult<()> {
        let doc_id = room_doc_id(session_id);
        let Some(rev) = self.current_rev(&doc_id).await? else {
            return Ok(());
        };

        let status = self
            .send(
                &doc_id,
                self.request(Method::DELETE, Some(&doc_id))
                    .query(&[("rev", rev)]),
            )
            .await?
            .status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(CouchDaoError::Status {
                path: doc_id,
                status,
            })
        }
    }

    async fn ping(&self) -> CouchResult<()> {
        let path = self.database_url.to_string();
        let status = self.send(&path, self.request(Method::GET, None)).await?.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(CouchDaoError::Status { path, status })
        }
    }
}

impl RoomStore for CouchRoomStore {
    fn put(&self, session_id: &str, record: SessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        if let Err(err) = ensure_record_key(session_id, &record) {
            return Box::pin(async move { Err(err) });
        }
        let store = self.clone();
        let session_id = session_id.to_string();
        Box::pin(async move { Ok(store.overwrite(&session_id, record).await?) })
    }

    fn get(&self, session_id: &str) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        let doc_id = room_doc_id(session_id);
        Box::pin(async move {
            let doc = store.get_document::<CouchRoomDocument>(&doc_id).await?;
            Ok(doc.map(|doc| doc.room))
        })
    }

    fn delete(&self, session_id: &str) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        let session_id = session_id.to_string();
        Box::pin(async move { Ok(store.remove(&session_id).await?) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.ping().await?) })
    }
}
