use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use rusqlite::Connection;
use serde_json::json;
use tracing_subscriber::fmt::MakeWriter;

use crate::adapters::db::{open_connection, run_migrations};
use crate::adapters::recharge_api::{AccountSession, RechargeApi, RechargeApiError};
use crate::domain::models::{Card, CardRfid, Charger, ChargerId};
use crate::domain::station::Location;

static TEST_DB_COUNTER: AtomicU64 = AtomicU64::new(0);

pub fn open_test_connection(test_name: &str) -> Connection {
    let template = ensure_template_db();
    let test_db_path = unique_test_db_path(test_name);

    if let Some(parent) = test_db_path.parent() {
        std::fs::create_dir_all(parent).expect("test db dir should be creatable");
    }

    std::fs::copy(&template, &test_db_path).expect("template db should be copied");
    open_connection(test_db_path.to_string_lossy().as_ref()).expect("test db should open")
}

fn ensure_template_db() -> PathBuf {
    static TEMPLATE_PATH: OnceLock<PathBuf> = OnceLock::new();

    TEMPLATE_PATH
        .get_or_init(|| {
            let template_path = std::env::var("TEST_DB_TEMPLATE_PATH")
                .ok()
                .filter(|value| !value.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(default_template_path);

            if let Some(parent) = template_path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent).expect("template parent dir should be creatable");
            }

            let mut connection = open_connection(template_path.to_string_lossy().as_ref())
                .expect("template db opens");
            run_migrations(&mut connection).expect("template migrations should succeed");

            template_path
        })
        .clone()
}

fn default_template_path() -> PathBuf {
    Path::new("./target/testdb/recharge_template.sqlite").to_path_buf()
}

fn unique_test_db_path(test_name: &str) -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let counter = TEST_DB_COUNTER.fetch_add(1, Ordering::Relaxed);
    Path::new("./target/testdb")
        .join(format!("{test_name}-{now}-{counter}.sqlite"))
        .to_path_buf()
}

pub fn sample_location(uid: i64, status: &str) -> Location {
    serde_json::from_value(json!({
        "uid": uid,
        "externalId": format!("location-{uid}"),
        "address": { "city": "Utrecht", "country": "NLD" },
        "evses": [{
            "uid": uid * 10,
            "externalId": format!("evse-{uid}"),
            "evseId": format!("NL*TNM*{uid}"),
            "status": status
        }]
    }))
    .expect("sample location should deserialize")
}

/// Scripted charging-network API. Location results are consumed in order;
/// once exhausted every lookup reports an empty location.
#[derive(Default)]
pub struct FakeRechargeApi {
    locations: Mutex<VecDeque<Result<Location, RechargeApiError>>>,
    hang_lookups: AtomicBool,
    lookups: AtomicUsize,
    session: Mutex<Option<Arc<FakeSession>>>,
    get_user_error: Mutex<Option<RechargeApiError>>,
}

impl FakeRechargeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: Arc<FakeSession>) -> Self {
        let api = Self::default();
        *api.session.lock().expect("fake lock") = Some(session);
        api
    }

    pub fn push_location(&self, result: Result<Location, RechargeApiError>) {
        self.locations.lock().expect("fake lock").push_back(result);
    }

    pub fn hang_lookups(&self) {
        self.hang_lookups.store(true, Ordering::SeqCst);
    }

    pub fn fail_get_user(&self, error: RechargeApiError) {
        *self.get_user_error.lock().expect("fake lock") = Some(error);
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RechargeApi for FakeRechargeApi {
    async fn location_by_id(&self, charger_id: &ChargerId) -> Result<Location, RechargeApiError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.hang_lookups.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }

        self.locations
            .lock()
            .expect("fake lock")
            .pop_front()
            .unwrap_or_else(|| Err(RechargeApiError::LocationEmpty(charger_id.clone())))
    }

    async fn get_user(
        &self,
        _email: &str,
        _password: &str,
    ) -> Result<Arc<dyn AccountSession>, RechargeApiError> {
        if let Some(error) = self.get_user_error.lock().expect("fake lock").clone() {
            return Err(error);
        }

        let session = self
            .session
            .lock()
            .expect("fake lock")
            .clone()
            .unwrap_or_else(|| Arc::new(FakeSession::default()));
        Ok(session)
    }
}

/// Account session double that records every call it receives.
#[derive(Default)]
pub struct FakeSession {
    pub cards: Vec<Card>,
    pub chargers: Vec<Charger>,
    authenticate_error: Mutex<Option<RechargeApiError>>,
    chargers_error: Mutex<Option<RechargeApiError>>,
    command_error: Mutex<Option<RechargeApiError>>,
    calls: Mutex<Vec<String>>,
}

impl FakeSession {
    pub fn with_options(cards: &[&str], chargers: &[&str]) -> Self {
        Self {
            cards: cards
                .iter()
                .map(|rfid| Card {
                    rfid: CardRfid::new(*rfid),
                    name: None,
                })
                .collect(),
            chargers: chargers
                .iter()
                .map(|id| Charger {
                    id: ChargerId::new(*id),
                    name: None,
                })
                .collect(),
            ..Self::default()
        }
    }

    pub fn fail_authentication(&self, error: RechargeApiError) {
        *self.authenticate_error.lock().expect("fake lock") = Some(error);
    }

    pub fn fail_chargers(&self, error: RechargeApiError) {
        *self.chargers_error.lock().expect("fake lock") = Some(error);
    }

    pub fn fail_commands(&self, error: RechargeApiError) {
        *self.command_error.lock().expect("fake lock") = Some(error);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("fake lock").clone()
    }

    fn record(&self, call: String) -> Result<(), RechargeApiError> {
        self.calls.lock().expect("fake lock").push(call);
        match self.command_error.lock().expect("fake lock").clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl AccountSession for FakeSession {
    async fn authenticate(&self) -> Result<(), RechargeApiError> {
        self.calls
            .lock()
            .expect("fake lock")
            .push("authenticate".to_string());
        match self.authenticate_error.lock().expect("fake lock").clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn get_cards(&self) -> Result<Vec<Card>, RechargeApiError> {
        Ok(self.cards.clone())
    }

    async fn get_chargers(&self) -> Result<Vec<Charger>, RechargeApiError> {
        if let Some(error) = self.chargers_error.lock().expect("fake lock").clone() {
            return Err(error);
        }
        Ok(self.chargers.clone())
    }

    async fn toggle_charger(
        &self,
        charger_id: &ChargerId,
        card_rfid: &CardRfid,
        on: bool,
    ) -> Result<(), RechargeApiError> {
        self.record(format!("toggle {charger_id} {card_rfid} {on}"))
    }

    async fn start_charging(&self) -> Result<(), RechargeApiError> {
        self.record("start_charging".to_string())
    }

    async fn stop_charging(&self) -> Result<(), RechargeApiError> {
        self.record("stop_charging".to_string())
    }
}

/// Log sink for asserting on emitted events within a single-threaded test.
#[derive(Clone, Default)]
pub struct CapturedLogs {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl CapturedLogs {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock().expect("log buffer lock")).into_owned()
    }

    pub fn error_lines(&self) -> Vec<String> {
        self.contents()
            .lines()
            .filter(|line| line.contains("ERROR"))
            .map(ToString::to_string)
            .collect()
    }
}

pub struct CapturedWriter {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl io::Write for CapturedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer
            .lock()
            .expect("log buffer lock")
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedWriter;

    fn make_writer(&'a self) -> Self::Writer {
        CapturedWriter {
            buffer: Arc::clone(&self.buffer),
        }
    }
}

pub fn capture_logs() -> (CapturedLogs, tracing::subscriber::DefaultGuard) {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (logs, guard)
}
