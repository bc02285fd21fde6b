use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fusion_solar_rs::{
    AuthError, AuthState, CaptchaError, CaptchaSolver, EventHandler, FusionSolarClient,
    FusionSolarError, PortalHttpClient, PortalRequest, PortalResponse, RequestBody, SessionEvent,
    SolverLoader, SolverSettings, TransportError,
};
use http::Method;

const PUBLIC_HOST: &str = "region01eu5.fusionsolar.huawei.com";
const LOGIN_HOST: &str = "eu5.fusionsolar.huawei.com";
const KPI: &str = "/rest/pvms/web/station/v1/station/total-real-kpi";
const LOGIN: &str = "/unisso/v2/validateUser.action";
const KPI_BODY: &str = r#"{"data": {"currentPower": 4.5, "dailyEnergy": 18.25, "cumulativeEnergy": 5120.0}}"#;
const CAPTCHA_PAGE: &str = r#"<html><form><input id="verificationCodeInput" type="text"/></form></html>"#;

type Route = (Method, String, String);

/// Portal double keyed by host and path. The last reply of a route repeats.
#[derive(Default)]
struct FakePortal {
    routes: Mutex<HashMap<Route, Vec<(u16, String)>>>,
    seen: Mutex<Vec<PortalRequest>>,
}

impl FakePortal {
    fn healthy() -> Self {
        Self::default()
            .reply(Method::GET, LOGIN_HOST, "/", 200, "<html><input id=\"username\"/></html>")
            .reply(Method::POST, LOGIN_HOST, LOGIN, 200, r#"{"errorMsg": null}"#)
            .reply(
                Method::GET,
                PUBLIC_HOST,
                "/rest/neteco/web/organization/v2/company/current",
                200,
                r#"{"data": {"moDn": "NE=123"}}"#,
            )
            .reply(
                Method::GET,
                PUBLIC_HOST,
                "/unisess/v1/auth/session",
                200,
                r#"{"csrfToken": "token-1"}"#,
            )
    }

    fn reply(self, method: Method, host: &str, path: &str, status: u16, body: &str) -> Self {
        self.routes
            .lock()
            .unwrap()
            .entry((method, host.to_string(), path.to_string()))
            .or_default()
            .push((status, body.to_string()));
        self
    }

    fn replace(self, method: Method, host: &str, path: &str, status: u16, body: &str) -> Self {
        self.routes
            .lock()
            .unwrap()
            .remove(&(method.clone(), host.to_string(), path.to_string()));
        self.reply(method, host, path, status, body)
    }

    fn calls(&self, method: Method, path: &str) -> Vec<PortalRequest> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter(|request| request.method == method && request.url.path() == path)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl PortalHttpClient for FakePortal {
    async fn execute(&self, request: PortalRequest) -> Result<PortalResponse, TransportError> {
        let key = (
            request.method.clone(),
            request.url.host_str().unwrap_or_default().to_string(),
            request.url.path().to_string(),
        );
        let url = request.url.clone();
        self.seen.lock().unwrap().push(request);

        let mut routes = self.routes.lock().unwrap();
        let reply = routes.get_mut(&key).and_then(|queue| {
            if queue.len() > 1 {
                Some(queue.remove(0))
            } else {
                queue.first().cloned()
            }
        });
        Ok(match reply {
            Some((status, body)) => PortalResponse::new(status, url, body),
            None => PortalResponse::new(404, url, "not found"),
        })
    }
}

struct CountingSolver {
    answer: &'static str,
    calls: AtomicUsize,
}

#[async_trait]
impl CaptchaSolver for CountingSolver {
    fn name(&self) -> &'static str {
        "counting"
    }

    async fn solve(&self, image: &[u8]) -> Result<String, CaptchaError> {
        assert_eq!(image, b"PNG");
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.answer.to_string())
    }
}

/// Hands out a fixed solver for any model.
struct FixedLoader;

impl SolverLoader for FixedLoader {
    fn load(&self, settings: &SolverSettings) -> Result<Arc<dyn CaptchaSolver>, CaptchaError> {
        assert!(settings.model_path.ends_with("captcha_huawei.onnx"));
        Ok(Arc::new(CountingSolver {
            answer: "x9y8",
            calls: AtomicUsize::new(0),
        }))
    }
}

fn model_file(tag: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("fusion-solar-{tag}-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("captcha_huawei.onnx");
    std::fs::write(&path, b"weights").unwrap();
    path
}

#[derive(Default)]
struct RecordingHandler {
    events: Mutex<Vec<String>>,
}

impl EventHandler for RecordingHandler {
    fn handle(&self, event: &SessionEvent) {
        let label = match event {
            SessionEvent::LoginAttempt(_) => "login",
            SessionEvent::Captcha(_) => "captcha",
            SessionEvent::Authenticated(_) => "authenticated",
            SessionEvent::Reauthenticate(_) => "reauthenticate",
            SessionEvent::Error(_) => "error",
        };
        self.events.lock().unwrap().push(label.to_string());
    }
}

fn captcha_portal() -> FakePortal {
    FakePortal::healthy()
        .replace(Method::GET, LOGIN_HOST, "/", 200, CAPTCHA_PAGE)
        .reply(Method::GET, LOGIN_HOST, "/unisso/verifycode", 200, "PNG")
        .reply(Method::POST, LOGIN_HOST, "/unisso/preValidVerifycode", 200, "success")
}

#[tokio::test]
async fn connect_establishes_identity_on_the_right_hosts() {
    let portal = Arc::new(FakePortal::healthy());
    let client = FusionSolarClient::builder("owner@example.com", "secret")
        .with_transport(portal.clone())
        .connect()
        .await
        .unwrap();

    assert_eq!(client.company_id().await.as_deref(), Some("NE=123"));
    assert_eq!(client.auth_state().await, AuthState::Authenticated);

    let logins = portal.calls(Method::POST, LOGIN);
    assert_eq!(logins.len(), 1);
    assert_eq!(logins[0].url.host_str(), Some(LOGIN_HOST));
    match &logins[0].body {
        RequestBody::Json(body) => {
            assert_eq!(body["username"], "owner@example.com");
            assert!(body.get("verifycode").is_none());
        }
        other => panic!("unexpected login body {other:?}"),
    }
}

#[tokio::test]
async fn operations_carry_the_anti_forgery_token() {
    let portal = Arc::new(FakePortal::healthy().reply(Method::GET, PUBLIC_HOST, KPI, 200, KPI_BODY));
    let client = FusionSolarClient::builder("owner@example.com", "secret")
        .with_transport(portal.clone())
        .connect()
        .await
        .unwrap();

    let status = client.get_power_status().await.unwrap();

    assert_eq!(status.total_power_today_kwh, 18.25);
    let kpi = portal.calls(Method::GET, KPI);
    assert_eq!(kpi[0].headers.get("roarand").unwrap(), "token-1");
}

#[tokio::test]
async fn expired_session_is_renewed_transparently() {
    let portal = Arc::new(
        FakePortal::healthy()
            .reply(Method::GET, PUBLIC_HOST, KPI, 200, KPI_BODY)
            .reply(Method::GET, PUBLIC_HOST, KPI, 200, "<html>login</html>")
            .reply(Method::GET, PUBLIC_HOST, KPI, 200, KPI_BODY),
    );
    let handler = Arc::new(RecordingHandler::default());
    let client = FusionSolarClient::builder("owner@example.com", "secret")
        .with_transport(portal.clone())
        .with_event_handler(handler.clone())
        .connect()
        .await
        .unwrap();

    client.get_power_status().await.unwrap();
    let status = client.get_power_status().await.unwrap();

    assert_eq!(status.current_power_kw, 4.5);
    assert_eq!(portal.calls(Method::POST, LOGIN).len(), 2);
    assert_eq!(portal.calls(Method::GET, KPI).len(), 3);
    let events = handler.events.lock().unwrap();
    assert_eq!(events.iter().filter(|event| *event == "reauthenticate").count(), 1);
    assert_eq!(events.iter().filter(|event| *event == "authenticated").count(), 2);
}

#[tokio::test]
async fn captcha_answer_is_prevalidated_and_submitted() {
    let portal = Arc::new(captcha_portal());
    let solver = Arc::new(CountingSolver {
        answer: " 7kq2 ",
        calls: AtomicUsize::new(0),
    });
    let client = FusionSolarClient::builder("owner@example.com", "secret")
        .with_transport(portal.clone())
        .with_captcha_solver(solver.clone())
        .connect()
        .await
        .unwrap();

    assert_eq!(client.company_id().await.as_deref(), Some("NE=123"));
    assert_eq!(solver.calls.load(Ordering::SeqCst), 1);

    let prevalidation = portal.calls(Method::POST, "/unisso/preValidVerifycode");
    assert_eq!(prevalidation.len(), 1);
    let logins = portal.calls(Method::POST, LOGIN);
    assert_eq!(logins.len(), 1);
    match &logins[0].body {
        RequestBody::Json(body) => assert_eq!(body["verifycode"], "7kq2"),
        other => panic!("unexpected login body {other:?}"),
    }
}

#[tokio::test]
async fn captcha_without_solver_never_submits_credentials() {
    let portal = Arc::new(captcha_portal());
    let client = FusionSolarClient::builder("owner@example.com", "secret")
        .with_transport(portal.clone())
        .build()
        .unwrap();

    let err = client.authenticate().await.unwrap_err();

    assert!(matches!(
        err,
        FusionSolarError::Authentication(AuthError::SolverUnavailable)
    ));
    assert!(portal.calls(Method::POST, LOGIN).is_empty());
    assert!(matches!(client.auth_state().await, AuthState::Failed(_)));
}

#[tokio::test]
async fn wrong_credentials_are_reported_as_rejection() {
    let portal = Arc::new(FakePortal::healthy().replace(
        Method::POST,
        LOGIN_HOST,
        LOGIN,
        200,
        r#"{"errorMsg": "Incorrect user name or password."}"#,
    ));

    let result = FusionSolarClient::builder("owner@example.com", "wrong")
        .with_transport(portal.clone())
        .connect()
        .await;

    match result {
        Err(FusionSolarError::Authentication(err)) => {
            assert!(err.is_rejection());
            assert!(err.to_string().contains("Incorrect user name or password."));
        }
        Err(other) => panic!("unexpected error {other}"),
        Ok(_) => panic!("login should have been rejected"),
    }
    assert!(portal.calls(Method::GET, "/unisess/v1/auth/session").is_empty());
}

#[tokio::test]
async fn plant_ids_come_from_the_station_list() {
    let portal = Arc::new(FakePortal::healthy().reply(
        Method::POST,
        PUBLIC_HOST,
        "/rest/pvms/web/station/v1/station/station-list",
        200,
        r#"{"success": true, "data": {"list": [{"dn": "NE=33594051", "name": "Roof"}, {"dn": "NE=33594052"}]}}"#,
    ));
    let client = FusionSolarClient::builder("owner@example.com", "secret")
        .with_transport(portal.clone())
        .build()
        .unwrap();

    let ids = client.get_plant_ids().await.unwrap();

    assert_eq!(ids, vec!["NE=33594051".to_string(), "NE=33594052".to_string()]);
    // first call logged in on demand
    assert_eq!(portal.calls(Method::POST, LOGIN).len(), 1);
}

#[tokio::test]
async fn model_without_loader_fails_before_submitting() {
    let portal = Arc::new(captcha_portal());
    let model = model_file("no-loader");
    let client = FusionSolarClient::builder("owner@example.com", "secret")
        .with_transport(portal.clone())
        .with_captcha_model(SolverSettings::new(&model))
        .build()
        .unwrap();

    let err = client.authenticate().await.unwrap_err();
    std::fs::remove_file(&model).unwrap();

    match err {
        FusionSolarError::Authentication(AuthError::Solver(CaptchaError::Configuration(message))) => {
            assert!(message.contains("register a SolverLoader"));
        }
        other => panic!("unexpected error {other}"),
    }
    assert!(portal.calls(Method::GET, "/unisso/verifycode").is_empty());
    assert!(portal.calls(Method::POST, LOGIN).is_empty());
}

#[tokio::test]
async fn model_with_loader_answers_the_captcha() {
    let portal = Arc::new(captcha_portal());
    let model = model_file("loader");
    let client = FusionSolarClient::builder("owner@example.com", "secret")
        .with_transport(portal.clone())
        .with_captcha_model(SolverSettings::new(&model))
        .with_solver_loader(Arc::new(FixedLoader))
        .connect()
        .await
        .unwrap();
    std::fs::remove_file(&model).unwrap();

    assert_eq!(client.company_id().await.as_deref(), Some("NE=123"));
    let logins = portal.calls(Method::POST, LOGIN);
    match &logins[0].body {
        RequestBody::Json(body) => assert_eq!(body["verifycode"], "x9y8"),
        other => panic!("unexpected login body {other:?}"),
    }
}
