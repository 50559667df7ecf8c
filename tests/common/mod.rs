#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::StatusCode;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

use docscan_gateway::auth::Identity;
use docscan_gateway::auth::local::LocalTokenVerifier;
use docscan_gateway::config::Config;
use docscan_gateway::db::{self, AccountStorage, DriveAccount, SqlitePool, TrackedFileStorage};
use docscan_gateway::drive::{DriveConnector, DriveFile, DriveFilePage, DriveFiles};
use docscan_gateway::error::GatewayError;
use docscan_gateway::google_oauth::state::StateSigner;
use docscan_gateway::google_oauth::{LinkTokens, OauthFlow};
use docscan_gateway::router::GatewayState;
use docscan_gateway::service::{AccountService, SyncEngine};
use docscan_gateway::upstream::Processing;
use docscan_gateway::upstream::types::{
    AskRequest, ChatAnswer, HandwritingRequest, HandwritingResult, IndexUpsert, OcrRequest,
    OcrResult, PageText, PdfExtraction,
};

pub const SECRET: &str = "test-secret";
pub const FOLDER_NAME: &str = "DocScanService";

pub fn test_config() -> Config {
    let mut cfg = Config::default();
    cfg.auth.jwt_secret = SECRET.to_string();
    cfg.upstream.internal_token = "internal".to_string();
    cfg.drive.app_folder_name = FOLDER_NAME.to_string();
    cfg
}

pub async fn memory_pool() -> SqlitePool {
    db::connect("sqlite::memory:")
        .await
        .expect("in-memory database")
}

pub fn bearer(user_id: &str) -> String {
    let token = LocalTokenVerifier::new(SECRET)
        .issue(
            &Identity {
                user_id: user_id.to_string(),
                email: None,
            },
            chrono::Duration::hours(1),
        )
        .expect("token");
    format!("Bearer {token}")
}

pub fn ts(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 10, minute, 0).unwrap()
}

/// Records every upstream call; answers are canned.
#[derive(Default)]
pub struct FakeProcessing {
    pub ocr_calls: Mutex<Vec<OcrRequest>>,
    pub upserts: Mutex<Vec<IndexUpsert>>,
    pub deletes: Mutex<Vec<String>>,
    pub asks: Mutex<Vec<AskRequest>>,
    pub user_ids: Mutex<Vec<String>>,
    pub fail_delete: bool,
    /// PDFs whose bytes equal one of these are "corrupt".
    pub corrupt_pdfs: HashSet<Vec<u8>>,
    pub handwriting: Mutex<Option<HandwritingResult>>,
    pub handwriting_calls: Mutex<Vec<HandwritingRequest>>,
}

impl FakeProcessing {
    fn saw(&self, user_id: &str) {
        self.user_ids.lock().unwrap().push(user_id.to_string());
    }

    pub fn upserted_doc_ids(&self) -> Vec<String> {
        self.upserts
            .lock()
            .unwrap()
            .iter()
            .map(|u| u.doc_id.clone())
            .collect()
    }

    pub fn last_ask(&self) -> AskRequest {
        self.asks.lock().unwrap().last().cloned().expect("no ask call")
    }
}

#[async_trait]
impl Processing for FakeProcessing {
    async fn extract_text(
        &self,
        user_id: &str,
        req: OcrRequest,
    ) -> Result<OcrResult, GatewayError> {
        self.saw(user_id);
        let text = format!("ocr text of {}", req.page_id);
        self.ocr_calls.lock().unwrap().push(req);
        Ok(serde_json::from_value(json!({ "text": text })).unwrap())
    }

    async fn clean_handwriting(
        &self,
        user_id: &str,
        req: HandwritingRequest,
    ) -> Result<HandwritingResult, GatewayError> {
        self.saw(user_id);
        let canned = self.handwriting.lock().unwrap().clone();
        let job_id = format!("hw_{}", req.page_id);
        self.handwriting_calls.lock().unwrap().push(req);
        Ok(canned.unwrap_or(HandwritingResult {
            job_id,
            status: "success".to_string(),
            clean_image_url: Some("https://cdn.example/clean.png".to_string()),
            error: None,
        }))
    }

    async fn extract_pdf_text(
        &self,
        user_id: &str,
        pdf: Bytes,
    ) -> Result<PdfExtraction, GatewayError> {
        self.saw(user_id);
        if self.corrupt_pdfs.contains(pdf.as_ref()) {
            return Err(GatewayError::Upstream {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                body: json!({ "detail": "corrupt pdf" }),
            });
        }
        Ok(PdfExtraction {
            pages: vec![
                PageText {
                    page_number: 1,
                    text: "page one".to_string(),
                },
                PageText {
                    page_number: 2,
                    text: "page two".to_string(),
                },
            ],
            total_pages: 2,
        })
    }

    async fn upsert_index(&self, user_id: &str, req: &IndexUpsert) -> Result<Value, GatewayError> {
        self.saw(user_id);
        self.upserts.lock().unwrap().push(req.clone());
        Ok(json!({ "ok": true, "doc_id": req.doc_id }))
    }

    async fn delete_index(&self, user_id: &str, doc_id: &str) -> Result<Value, GatewayError> {
        self.saw(user_id);
        self.deletes.lock().unwrap().push(doc_id.to_string());
        if self.fail_delete {
            return Err(GatewayError::Upstream {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                body: json!("index unavailable"),
            });
        }
        Ok(json!({ "ok": true }))
    }

    async fn ask_chat(&self, user_id: &str, req: &AskRequest) -> Result<ChatAnswer, GatewayError> {
        self.saw(user_id);
        self.asks.lock().unwrap().push(req.clone());
        if req.question == "explode" {
            return Err(GatewayError::Upstream {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                body: json!({ "detail": "question rejected" }),
            });
        }
        Ok(serde_json::from_value(json!({
            "answer": format!("answer to {}", req.question),
            "citations": [{ "doc_id": "d1", "page": 1 }],
            "used_chunks": 3
        }))
        .unwrap())
    }
}

/// In-memory Drive: one flat set of files under whatever folder gets created.
pub struct FakeDrive {
    pub files: Mutex<Vec<DriveFile>>,
    pub contents: Mutex<HashMap<String, Bytes>>,
    pub folders: Mutex<HashMap<String, String>>,
    pub folder_creates: AtomicUsize,
    pub page_size: usize,
}

impl FakeDrive {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            files: Mutex::new(Vec::new()),
            contents: Mutex::new(HashMap::new()),
            folders: Mutex::new(HashMap::new()),
            folder_creates: AtomicUsize::new(0),
            page_size: 2,
        })
    }

    pub fn add(&self, id: &str, mime: &str, modified: DateTime<Utc>, content: &[u8]) {
        self.files.lock().unwrap().push(DriveFile {
            id: id.to_string(),
            name: Some(format!("{id}.file")),
            mime_type: Some(mime.to_string()),
            modified_time: Some(modified),
            md5_checksum: Some(format!("md5-{id}")),
            size: None,
        });
        self.contents
            .lock()
            .unwrap()
            .insert(id.to_string(), Bytes::copy_from_slice(content));
    }

    pub fn remove(&self, id: &str) {
        self.files.lock().unwrap().retain(|f| f.id != id);
    }

    pub fn touch(&self, id: &str, modified: DateTime<Utc>) {
        for f in self.files.lock().unwrap().iter_mut() {
            if f.id == id {
                f.modified_time = Some(modified);
            }
        }
    }

    fn not_found(id: &str) -> GatewayError {
        GatewayError::Drive {
            status: StatusCode::NOT_FOUND,
            message: format!("file {id} not found"),
        }
    }
}

#[async_trait]
impl DriveFiles for FakeDrive {
    async fn find_folder(&self, name: &str) -> Result<Option<String>, GatewayError> {
        Ok(self.folders.lock().unwrap().get(name).cloned())
    }

    async fn create_folder(&self, name: &str) -> Result<String, GatewayError> {
        // widen the window for concurrent first calls
        tokio::time::sleep(Duration::from_millis(20)).await;
        let n = self.folder_creates.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("folder-{n}");
        self.folders
            .lock()
            .unwrap()
            .insert(name.to_string(), id.clone());
        Ok(id)
    }

    async fn list_folder(
        &self,
        _folder_id: &str,
        page_token: Option<&str>,
    ) -> Result<DriveFilePage, GatewayError> {
        let files = self.files.lock().unwrap().clone();
        let start: usize = page_token.map(|t| t.parse().unwrap()).unwrap_or(0);
        let end = (start + self.page_size).min(files.len());
        Ok(DriveFilePage {
            files: files[start..end].to_vec(),
            next_page_token: (end < files.len()).then(|| end.to_string()),
        })
    }

    async fn export_text(&self, file_id: &str, export_mime: &str) -> Result<String, GatewayError> {
        Ok(format!("exported {file_id} as {export_mime}"))
    }

    async fn download(&self, file_id: &str) -> Result<Bytes, GatewayError> {
        self.contents
            .lock()
            .unwrap()
            .get(file_id)
            .cloned()
            .ok_or_else(|| Self::not_found(file_id))
    }

    async fn upload(
        &self,
        _folder_id: &str,
        name: &str,
        mime_type: &str,
        data: Bytes,
    ) -> Result<DriveFile, GatewayError> {
        let id = format!("up-{}", self.files.lock().unwrap().len() + 1);
        let file = DriveFile {
            id: id.clone(),
            name: Some(name.to_string()),
            mime_type: Some(mime_type.to_string()),
            modified_time: Some(ts(0)),
            md5_checksum: None,
            size: Some(data.len().to_string()),
        };
        self.files.lock().unwrap().push(file.clone());
        self.contents.lock().unwrap().insert(id, data);
        Ok(file)
    }
}

pub struct FakeConnector(pub Arc<FakeDrive>);

#[async_trait]
impl DriveConnector for FakeConnector {
    async fn connect(&self, refresh_token: &str) -> Result<Arc<dyn DriveFiles>, GatewayError> {
        assert!(!refresh_token.is_empty());
        Ok(self.0.clone())
    }
}

/// Code `first` yields a refresh token, anything else mimics a repeat consent.
pub struct FakeOauth;

#[async_trait]
impl OauthFlow for FakeOauth {
    fn authorize_url(&self, state: &str) -> Result<Url, GatewayError> {
        let mut url = Url::parse("https://accounts.example/auth")?;
        url.query_pairs_mut().append_pair("state", state);
        Ok(url)
    }

    async fn exchange_code(&self, code: &str) -> Result<LinkTokens, GatewayError> {
        Ok(LinkTokens {
            refresh_token: (code == "first").then(|| "rt-1".to_string()),
            scope: Some("https://www.googleapis.com/auth/drive.file".to_string()),
            token_type: Some("Bearer".to_string()),
        })
    }

    async fn access_token(&self, _refresh_token: &str) -> Result<String, GatewayError> {
        Ok("access".to_string())
    }
}

pub struct DriveHarness {
    pub pool: SqlitePool,
    pub drive: Arc<FakeDrive>,
    pub processing: Arc<FakeProcessing>,
    pub accounts: Arc<AccountService>,
    pub engine: SyncEngine,
    pub files: TrackedFileStorage,
}

impl DriveHarness {
    pub async fn new(processing: FakeProcessing) -> Self {
        let pool = memory_pool().await;
        let drive = FakeDrive::new();
        let processing = Arc::new(processing);
        let files = TrackedFileStorage::new(pool.clone());
        let accounts = Arc::new(AccountService::new(
            AccountStorage::new(pool.clone()),
            files.clone(),
            Arc::new(FakeOauth),
            Arc::new(FakeConnector(drive.clone())),
            StateSigner::new(SECRET),
            FOLDER_NAME,
        ));
        let engine = SyncEngine::new(
            accounts.clone(),
            files.clone(),
            processing.clone(),
            vec!["vi".to_string(), "en".to_string()],
        );
        Self {
            pool,
            drive,
            processing,
            accounts,
            engine,
            files,
        }
    }

    pub async fn link(&self, user_id: &str) {
        AccountStorage::new(self.pool.clone())
            .upsert_link(&DriveAccount {
                user_id: user_id.to_string(),
                refresh_token: "rt-1".to_string(),
                folder_id: None,
                scope: None,
                token_type: None,
            })
            .await
            .unwrap();
    }
}

/// Router state over fakes. `drive` switches the Drive routes on.
pub async fn gateway_state(
    cfg: Config,
    processing: Arc<FakeProcessing>,
    drive: Option<Arc<FakeDrive>>,
) -> (GatewayState, SqlitePool) {
    let pool = memory_pool().await;
    let verifier = Arc::new(LocalTokenVerifier::new(SECRET));
    let backend = drive.map(|d| {
        (
            Arc::new(FakeOauth) as Arc<dyn OauthFlow>,
            Arc::new(FakeConnector(d)) as Arc<dyn DriveConnector>,
        )
    });
    let state = GatewayState::assemble(cfg, pool.clone(), verifier, processing, backend);
    (state, pool)
}
