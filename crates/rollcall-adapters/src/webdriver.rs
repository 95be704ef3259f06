//! W3C WebDriver browser agent
//!
//! Every handle owns its own WebDriver session, so each supervisor gets an
//! isolated browser context. Element lookups are polled until a timeout.
//!
//! New-session requests run detached from the caller. A session the driver
//! creates is always registered, even when the caller was aborted while
//! waiting, so `close_all` can still delete it.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use rollcall_adapter_api::{
    BrowserDriver, BrowserError, BrowserHandle, BrowserHandlePayload, BrowserResult, Credentials,
};
use rollcall_config::{BrowserConfig, BrowserSelectors};
use rollcall_util::SessionId;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Key under which W3C drivers return element references
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f405ba00489";

/// How long each sign-in field may take to appear
const SIGN_IN_STEP_TIMEOUT: Duration = Duration::from_secs(15);

/// How long optional in-session controls are looked for
const PREPARE_STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// Onboarding popups shown after joining
const ONBOARDING_DIALOGS: usize = 2;

/// How long `close_all` waits on new-session requests still in flight
const OPENING_SETTLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Element location strategy derived from a configured selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    pub using: &'static str,
    pub value: String,
}

impl Locator {
    /// XPath when the selector starts with `/` or `(`, CSS otherwise
    pub fn parse(selector: &str) -> Self {
        let selector = selector.trim();
        let using = if selector.starts_with('/') || selector.starts_with('(') {
            "xpath"
        } else {
            "css selector"
        };
        Self {
            using,
            value: selector.to_string(),
        }
    }

    fn to_json(&self) -> Value {
        json!({ "using": self.using, "value": self.value })
    }
}

/// New-session capabilities for Chrome.
///
/// Media permission prompts are auto-accepted so joining never blocks on them.
pub fn chrome_capabilities(headless: bool) -> Value {
    let mut args = vec![
        "--use-fake-ui-for-media-stream",
        "--disable-notifications",
        "--window-size=1280,900",
    ];
    if headless {
        args.push("--headless=new");
    }
    json!({
        "capabilities": {
            "alwaysMatch": {
                "browserName": "chrome",
                "goog:chromeOptions": { "args": args }
            }
        }
    })
}

/// WebDriver sessions this process is responsible for
#[derive(Debug, Default)]
struct Registry {
    open: HashSet<String>,
    /// New-session requests sent and not yet answered
    opening: usize,
}

type SharedRegistry = Arc<Mutex<Registry>>;

fn lock(registry: &SharedRegistry) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Counts one in-flight new-session request until dropped
struct Opening(SharedRegistry);

impl Opening {
    fn begin(registry: &SharedRegistry) -> Self {
        lock(registry).opening += 1;
        Self(registry.clone())
    }
}

impl Drop for Opening {
    fn drop(&mut self) {
        lock(&self.0).opening -= 1;
    }
}

pub struct WebDriverBrowser {
    client: Client,
    base_url: String,
    headless: bool,
    sign_in_url: String,
    poll_interval: Duration,
    selectors: BrowserSelectors,
    registry: SharedRegistry,
}

impl WebDriverBrowser {
    pub fn new(config: &BrowserConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(client: Client, config: &BrowserConfig) -> Self {
        Self {
            client,
            base_url: config.webdriver_url.trim_end_matches('/').to_string(),
            headless: config.headless,
            sign_in_url: config.sign_in_url.clone(),
            poll_interval: config.poll_interval,
            selectors: config.selectors.clone(),
            registry: SharedRegistry::default(),
        }
    }

    /// WebDriver sessions opened and not yet deleted
    pub fn open_sessions(&self) -> usize {
        lock(&self.registry).open.len()
    }

    fn request(&self, method: Method, path: &str, body: Option<Value>) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let request = self.client.request(method, &url);
        match body {
            Some(body) => request.json(&body),
            None => request,
        }
    }

    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> BrowserResult<Value> {
        send(self.request(method, path, body)).await
    }

    async fn find_all(&self, session: &str, selector: &str) -> BrowserResult<Vec<String>> {
        let value = self
            .command(
                Method::POST,
                &format!("/session/{}/elements", session),
                Some(Locator::parse(selector).to_json()),
            )
            .await?;
        Ok(element_ids(&value))
    }

    /// Poll for the first match of `selector` until `timeout` passes
    async fn wait_for(&self, session: &str, selector: &str, timeout: Duration) -> BrowserResult<String> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(first) = self.find_all(session, selector).await?.into_iter().next() {
                return Ok(first);
            }
            if Instant::now() >= deadline {
                return Err(BrowserError::control_not_found(selector));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn click(&self, session: &str, element: &str) -> BrowserResult<()> {
        self.command(
            Method::POST,
            &format!("/session/{}/element/{}/click", session, element),
            Some(json!({})),
        )
        .await?;
        Ok(())
    }

    async fn wait_and_click(&self, session: &str, selector: &str, timeout: Duration) -> BrowserResult<()> {
        let element = self.wait_for(session, selector, timeout).await?;
        self.click(session, &element).await
    }

    async fn type_into(&self, session: &str, selector: &str, text: &str) -> BrowserResult<()> {
        let element = self.wait_for(session, selector, SIGN_IN_STEP_TIMEOUT).await?;
        self.command(
            Method::POST,
            &format!("/session/{}/element/{}/value", session, element),
            Some(json!({ "text": text })),
        )
        .await?;
        Ok(())
    }

    async fn element_text(&self, session: &str, element: &str) -> BrowserResult<String> {
        let value = self
            .command(
                Method::GET,
                &format!("/session/{}/element/{}/text", session, element),
                None,
            )
            .await?;
        Ok(value.as_str().unwrap_or_default().trim().to_string())
    }

    async fn go_to(&self, session: &str, url: &str) -> BrowserResult<()> {
        self.command(
            Method::POST,
            &format!("/session/{}/url", session),
            Some(json!({ "url": url })),
        )
        .await?;
        Ok(())
    }

    async fn delete_session(&self, session: &str) -> BrowserResult<()> {
        let result = self
            .command(Method::DELETE, &format!("/session/{}", session), None)
            .await;
        lock(&self.registry).open.remove(session);
        result.map(|_| ())
    }
}

async fn send(request: RequestBuilder) -> BrowserResult<Value> {
    let response = request
        .send()
        .await
        .map_err(|e| BrowserError::Transport(e.to_string()))?;
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| BrowserError::Transport(e.to_string()))?;

    let mut body: Value = serde_json::from_str(&text).map_err(|e| {
        BrowserError::Protocol(format!("HTTP {} with unreadable body: {}", status, e))
    })?;
    if !status.is_success() {
        return Err(error_from_value(&body));
    }
    Ok(body.get_mut("value").map(Value::take).unwrap_or(Value::Null))
}

/// Send a new-session request and register whatever session comes back
async fn create_session(request: RequestBuilder, registry: SharedRegistry) -> BrowserResult<String> {
    let value = send(request).await?;
    let session = value
        .get("sessionId")
        .and_then(Value::as_str)
        .ok_or_else(|| BrowserError::Protocol("new session response has no sessionId".into()))?
        .to_string();

    lock(&registry).open.insert(session.clone());
    Ok(session)
}

fn session_of(handle: &BrowserHandle) -> BrowserResult<&str> {
    handle
        .payload()
        .webdriver_session()
        .ok_or(BrowserError::SessionNotFound)
}

#[async_trait]
impl BrowserDriver for WebDriverBrowser {
    async fn open_session(&self, session_id: &SessionId) -> BrowserResult<BrowserHandle> {
        let request = self.request(
            Method::POST,
            "/session",
            Some(chrome_capabilities(self.headless)),
        );
        let registry = self.registry.clone();
        // Counted before spawning so close_all never misses it
        let opening = Opening::begin(&registry);
        let created = tokio::spawn(async move {
            let session = create_session(request, registry).await;
            drop(opening);
            session
        });
        let session = created
            .await
            .map_err(|e| BrowserError::Internal(format!("new session task failed: {}", e)))??;

        info!(session_id = %session_id, webdriver_session = %session, "Browser context opened");

        Ok(BrowserHandle::new(
            session_id.clone(),
            BrowserHandlePayload::WebDriver { session },
        ))
    }

    async fn sign_in(&self, handle: &BrowserHandle, credentials: &Credentials) -> BrowserResult<()> {
        let session = session_of(handle)?;
        let s = &self.selectors;

        self.go_to(session, &self.sign_in_url).await?;
        self.type_into(session, &s.email_input, &credentials.email).await?;
        self.wait_and_click(session, &s.email_next, SIGN_IN_STEP_TIMEOUT).await?;
        self.type_into(session, &s.password_input, credentials.password())
            .await
            .map_err(|e| match e {
                BrowserError::ControlNotFound { .. } => {
                    BrowserError::SignInRejected(format!("account {} not accepted", credentials.email))
                }
                other => other,
            })?;
        self.wait_and_click(session, &s.password_next, SIGN_IN_STEP_TIMEOUT).await?;

        debug!(session_id = %handle.session_id, email = %credentials.email, "Signed in");
        Ok(())
    }

    async fn navigate(&self, handle: &BrowserHandle, link: &str) -> BrowserResult<()> {
        self.go_to(session_of(handle)?, link).await
    }

    async fn click_join(&self, handle: &BrowserHandle, timeout: Duration) -> BrowserResult<()> {
        let session = session_of(handle)?;
        self.wait_and_click(session, &self.selectors.join_button, timeout).await
    }

    async fn is_live(&self, handle: &BrowserHandle) -> BrowserResult<bool> {
        let session = session_of(handle)?;
        Ok(!self
            .find_all(session, &self.selectors.in_session_marker)
            .await?
            .is_empty())
    }

    async fn prepare_session(&self, handle: &BrowserHandle) -> BrowserResult<()> {
        let session = session_of(handle)?;
        let s = &self.selectors;

        self.wait_and_click(session, &s.mute_button, PREPARE_STEP_TIMEOUT).await?;
        for _ in 0..ONBOARDING_DIALOGS {
            match self
                .wait_and_click(session, &s.dialog_dismiss, PREPARE_STEP_TIMEOUT)
                .await
            {
                Ok(()) => {}
                // Not every account is shown the onboarding popups
                Err(BrowserError::ControlNotFound { .. }) => break,
                Err(e) => return Err(e),
            }
        }
        self.wait_and_click(session, &s.people_panel_button, PREPARE_STEP_TIMEOUT)
            .await
    }

    async fn admit_waiting(&self, handle: &BrowserHandle) -> BrowserResult<usize> {
        let session = session_of(handle)?;
        let mut admitted = 0;
        for element in self.find_all(session, &self.selectors.admit_button).await? {
            match self.click(session, &element).await {
                Ok(()) => admitted += 1,
                Err(e) => debug!(session_id = %handle.session_id, error = %e, "Admit control went away"),
            }
        }
        Ok(admitted)
    }

    async fn list_participants(&self, handle: &BrowserHandle) -> BrowserResult<Vec<String>> {
        let session = session_of(handle)?;
        let mut names = Vec::new();
        for element in self.find_all(session, &self.selectors.participant_name).await? {
            let name = self.element_text(session, &element).await?;
            if !name.is_empty() {
                names.push(name);
            }
        }
        Ok(names)
    }

    async fn close(&self, handle: &BrowserHandle) -> BrowserResult<()> {
        let session = session_of(handle)?;
        self.delete_session(session).await?;
        info!(session_id = %handle.session_id, webdriver_session = %session, "Browser context closed");
        Ok(())
    }

    async fn close_all(&self) -> usize {
        let deadline = Instant::now() + OPENING_SETTLE_TIMEOUT;
        let mut closed = 0;
        loop {
            let (sessions, opening) = {
                let registry = lock(&self.registry);
                (registry.open.iter().cloned().collect::<Vec<_>>(), registry.opening)
            };
            if sessions.is_empty() && opening == 0 {
                break;
            }

            for session in sessions {
                match self.delete_session(&session).await {
                    Ok(()) => closed += 1,
                    Err(e) => warn!(webdriver_session = %session, error = %e, "Failed to close browser context"),
                }
            }

            if opening > 0 {
                if Instant::now() >= deadline {
                    warn!(opening, "Gave up waiting on browser contexts still being opened");
                    break;
                }
                debug!(opening, "Waiting on browser contexts still being opened");
                tokio::time::sleep(self.poll_interval).await;
            }
        }
        closed
    }
}

/// Element references in a find-elements result
pub fn element_ids(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|elements| {
            elements
                .iter()
                .filter_map(|e| e.get(ELEMENT_KEY).and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Map a W3C error body onto a browser error
pub fn error_from_value(body: &Value) -> BrowserError {
    let value = body.get("value").unwrap_or(body);
    let code = value.get("error").and_then(Value::as_str).unwrap_or("unknown error");
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default();

    match code {
        "no such element" | "stale element reference" | "element not interactable" => {
            BrowserError::control_not_found(message)
        }
        "invalid session id" | "no such window" => BrowserError::SessionNotFound,
        _ => BrowserError::Protocol(format!("{}: {}", code, message)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(webdriver_url: String) -> BrowserConfig {
        BrowserConfig {
            webdriver_url,
            headless: true,
            sign_in_url: "https://accounts.example.com".into(),
            poll_interval: Duration::from_millis(10),
            selectors: BrowserSelectors::default(),
        }
    }

    async fn mount_new_session(server: &MockServer, session: &str, delay: Duration) {
        Mock::given(method("POST"))
            .and(path("/session"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"value": {"sessionId": session, "capabilities": {}}}))
                    .set_delay(delay),
            )
            .mount(server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(format!("/session/{}", session)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": null})))
            .expect(1)
            .mount(server)
            .await;
    }

    #[test]
    fn locator_strategy_follows_selector_shape() {
        assert_eq!(Locator::parse("#identifierNext").using, "css selector");
        assert_eq!(Locator::parse(r#"[type="email"]"#).using, "css selector");
        assert_eq!(Locator::parse(r#"//*[text()="Got it"]"#).using, "xpath");
        assert_eq!(Locator::parse(r#"(//button)[2]"#).using, "xpath");
        assert_eq!(
            Locator::parse("  //div ").to_json(),
            json!({"using": "xpath", "value": "//div"})
        );
    }

    #[test]
    fn default_selectors_resolve_to_expected_strategies() {
        let s = BrowserSelectors::default();
        assert_eq!(Locator::parse(&s.join_button).using, "css selector");
        assert_eq!(Locator::parse(&s.people_panel_button).using, "xpath");
        assert_eq!(Locator::parse(&s.admit_button).using, "xpath");
        assert_eq!(Locator::parse(&s.participant_name).using, "css selector");
    }

    #[test]
    fn capabilities_toggle_headless() {
        let args = |caps: Value| {
            caps["capabilities"]["alwaysMatch"]["goog:chromeOptions"]["args"]
                .as_array()
                .unwrap()
                .iter()
                .map(|a| a.as_str().unwrap().to_string())
                .collect::<Vec<_>>()
        };
        assert!(args(chrome_capabilities(true)).contains(&"--headless=new".to_string()));
        assert!(!args(chrome_capabilities(false)).contains(&"--headless=new".to_string()));
        assert!(args(chrome_capabilities(false)).contains(&"--use-fake-ui-for-media-stream".to_string()));
    }

    #[test]
    fn element_ids_from_find_result() {
        let value = json!([
            {ELEMENT_KEY: "e-1"},
            {ELEMENT_KEY: "e-2"},
            {"unexpected": "e-3"}
        ]);
        assert_eq!(element_ids(&value), vec!["e-1", "e-2"]);
        assert!(element_ids(&json!(null)).is_empty());
    }

    #[test]
    fn error_codes_map_to_browser_errors() {
        let missing = json!({"value": {"error": "no such element", "message": "gone"}});
        assert!(error_from_value(&missing).is_transient());

        let session = json!({"value": {"error": "invalid session id", "message": ""}});
        assert!(matches!(error_from_value(&session), BrowserError::SessionNotFound));

        let other = json!({"value": {"error": "javascript error", "message": "boom"}});
        match error_from_value(&other) {
            BrowserError::Protocol(message) => assert_eq!(message, "javascript error: boom"),
            e => panic!("unexpected error: {}", e),
        }
    }

    #[tokio::test]
    async fn mock_handles_are_rejected() {
        let browser = WebDriverBrowser::new(&config("http://127.0.0.1:9".into()));
        let handle = BrowserHandle::new(SessionId::new(), BrowserHandlePayload::Mock { id: 1 });

        assert!(matches!(
            browser.is_live(&handle).await,
            Err(BrowserError::SessionNotFound)
        ));
        assert_eq!(browser.close_all().await, 0);
        assert_eq!(browser.open_sessions(), 0);
    }

    #[tokio::test]
    async fn opened_session_is_closed() {
        let server = MockServer::start().await;
        mount_new_session(&server, "wd-1", Duration::ZERO).await;
        let browser = WebDriverBrowser::new(&config(server.uri()));

        let handle = browser.open_session(&SessionId::new()).await.unwrap();
        assert_eq!(handle.payload().webdriver_session(), Some("wd-1"));
        assert_eq!(browser.open_sessions(), 1);

        browser.close(&handle).await.unwrap();
        assert_eq!(browser.open_sessions(), 0);
        assert_eq!(browser.close_all().await, 0);
    }

    #[tokio::test]
    async fn close_all_catches_session_opened_by_aborted_caller() {
        let server = MockServer::start().await;
        mount_new_session(&server, "wd-late", Duration::from_millis(300)).await;
        let browser = Arc::new(WebDriverBrowser::new(&config(server.uri())));

        let opener = tokio::spawn({
            let browser = browser.clone();
            async move { browser.open_session(&SessionId::new()).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        opener.abort();
        assert!(opener.await.unwrap_err().is_cancelled());

        // The driver answers after the caller is gone
        assert_eq!(browser.close_all().await, 1);
        assert_eq!(browser.open_sessions(), 0);
        server.verify().await;
    }
}
