//! QR-code login.
//!
//! [`QrSession`] is a pure state machine: [`transition`] takes the session
//! and one server payload and returns the next session plus the side
//! effects to perform.  [`QrLogin`] owns the modal, the poll loop and the
//! per-platform [`LoginBook`], and executes those effects.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use music_proto::config::Config;
use music_proto::protocol::{LoginStatus, QrPayload, QrState, LOGIN_PLATFORMS};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::action::{QrView, UiEvent, UiSink};
use crate::error::{ClientError, ValidationError};
use crate::gateway::{ApiRequest, CallMode, RequestGateway};
use crate::polling::{ErrorPolicy, PollLoop, StartPolicy, TickOutcome};

const DEFAULT_ERROR: &str = "login failed";

/// User-facing status lines of the dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QrStatus {
    Starting,
    ScanWithApp,
    ConfirmOnPhone,
    Refreshing,
    LoggedIn,
}

impl QrStatus {
    pub fn text(self, platform: &str) -> String {
        match self {
            Self::Starting => "requesting a login code...".to_string(),
            Self::ScanWithApp => format!("scan the code with the {} app", platform),
            Self::ConfirmOnPhone => "scanned, confirm the login on your phone".to_string(),
            Self::Refreshing => "code expired, fetching a new one...".to_string(),
            Self::LoggedIn => "login successful".to_string(),
        }
    }
}

/// Side effect requested by a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum QrCommand {
    ShowSpinner(QrStatus),
    ShowImage(String),
    ShowStatus(QrStatus),
    ShowSuccess(QrStatus),
    ShowError(String),
    StopPolling,
    MarkLoggedIn { nickname: String },
    ScheduleClose,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QrSession {
    pub state: QrState,
    /// Last image shown, if any.
    pub image: Option<String>,
    pub error: Option<String>,
}

impl QrSession {
    pub fn new() -> Self {
        Self {
            state: QrState::Starting,
            image: None,
            error: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }

    /// Apply `payload` in place and return the commands to execute.
    pub fn apply(&mut self, payload: &QrPayload) -> Vec<QrCommand> {
        let (next, commands) = transition(self, payload);
        *self = next;
        commands
    }
}

impl Default for QrSession {
    fn default() -> Self {
        Self::new()
    }
}

/// The login state machine.
///
/// Once a session reached `success` or `error` it is frozen: any further
/// payload yields the same session and no commands.
pub fn transition(session: &QrSession, payload: &QrPayload) -> (QrSession, Vec<QrCommand>) {
    if session.is_finished() {
        return (session.clone(), Vec::new());
    }

    let mut next = session.clone();
    next.state = payload.state;
    let fresh_image = payload.qr_image.clone().filter(|img| !img.is_empty());

    let commands = match payload.state {
        QrState::Starting => vec![QrCommand::ShowSpinner(QrStatus::Starting)],
        QrState::WaitingScan | QrState::Expired => {
            let status = if payload.state == QrState::Expired {
                QrStatus::Refreshing
            } else {
                QrStatus::ScanWithApp
            };
            let mut commands = Vec::with_capacity(2);
            if let Some(image) = fresh_image {
                if next.image.as_deref() != Some(image.as_str()) {
                    commands.push(QrCommand::ShowImage(image.clone()));
                }
                next.image = Some(image);
            }
            commands.push(QrCommand::ShowStatus(status));
            commands
        }
        QrState::Scanned => vec![QrCommand::ShowStatus(QrStatus::ConfirmOnPhone)],
        QrState::Success => vec![
            QrCommand::ShowSuccess(QrStatus::LoggedIn),
            QrCommand::StopPolling,
            QrCommand::MarkLoggedIn {
                nickname: payload.nickname.clone().unwrap_or_default(),
            },
            QrCommand::ScheduleClose,
        ],
        QrState::Error => {
            let message = payload
                .error
                .clone()
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_ERROR.to_string());
            next.error = Some(message.clone());
            vec![QrCommand::ShowError(message), QrCommand::StopPolling]
        }
    };

    (next, commands)
}

// ── Login book ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginState {
    pub logged_in: bool,
    pub nickname: String,
}

/// Per-platform login state, shared between the controller and the front end.
#[derive(Clone, Default)]
pub struct LoginBook {
    inner: Arc<RwLock<HashMap<String, LoginState>>>,
}

impl LoginBook {
    pub fn get(&self, platform: &str) -> LoginState {
        let map = self.inner.read().unwrap_or_else(|e| e.into_inner());
        map.get(platform).cloned().unwrap_or_default()
    }

    pub fn set(&self, platform: &str, state: LoginState) {
        let mut map = self.inner.write().unwrap_or_else(|e| e.into_inner());
        map.insert(platform.to_string(), state);
    }

    pub fn clear(&self, platform: &str) {
        self.set(platform, LoginState::default());
    }
}

// ── Controller ───────────────────────────────────────────────────────────────

struct Modal {
    id: u64,
    platform: String,
    /// `None` for the static "already logged in" view.
    session: Option<Arc<Mutex<QrSession>>>,
}

struct Inner {
    gateway: RequestGateway,
    ui: UiSink,
    logins: LoginBook,
    poll: PollLoop,
    modal: Mutex<Option<Modal>>,
    next_id: AtomicU64,
    poll_interval: Duration,
    close_delay: Duration,
}

#[derive(Clone)]
pub struct QrLogin {
    inner: Arc<Inner>,
}

impl QrLogin {
    pub fn new(gateway: RequestGateway, ui: UiSink, logins: LoginBook, config: &Config) -> Self {
        Self {
            inner: Arc::new(Inner {
                gateway,
                ui,
                logins,
                poll: PollLoop::new("qr", StartPolicy::Restart, ErrorPolicy::Ignore),
                modal: Mutex::new(None),
                next_id: AtomicU64::new(0),
                poll_interval: config.polling.qr_interval(),
                close_delay: Duration::from_millis(config.ui.qr_close_delay_ms),
            }),
        }
    }

    pub fn logins(&self) -> &LoginBook {
        &self.inner.logins
    }

    /// Platform whose dialog is open, if any.
    pub fn open_platform(&self) -> Option<String> {
        self.modal().as_ref().map(|m| m.platform.clone())
    }

    pub fn is_polling(&self) -> bool {
        self.inner.poll.is_running()
    }

    /// State of the currently open session, if one is active.
    pub fn session(&self) -> Option<QrSession> {
        let modal = self.modal();
        let session = modal.as_ref()?.session.as_ref()?;
        let guard = session.lock().unwrap_or_else(|e| e.into_inner());
        Some(guard.clone())
    }

    /// Open the login dialog for `platform`.
    ///
    /// An already logged-in platform gets a static view.  Otherwise a fresh
    /// session is requested and polled until it succeeds or fails.  A
    /// failing start request is shown inside the dialog.
    pub async fn open(&self, platform: &str) -> Result<(), ClientError> {
        check_platform(platform)?;

        let login = self.inner.logins.get(platform);
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        if login.logged_in {
            self.replace_modal(Modal {
                id,
                platform: platform.to_string(),
                session: None,
            });
            self.emit_view(
                platform,
                QrView::LoggedIn {
                    nickname: login.nickname,
                },
            );
            return Ok(());
        }

        let session = Arc::new(Mutex::new(QrSession::new()));
        self.replace_modal(Modal {
            id,
            platform: platform.to_string(),
            session: Some(Arc::clone(&session)),
        });
        self.emit_view(platform, QrView::Spinner(QrStatus::Starting.text(platform)));
        info!("qr login: session {} for {}", id, platform);

        let request = ApiRequest::post("login/qr/start").query("platform", platform);
        let started = self
            .inner
            .gateway
            .call::<QrPayload>(request, CallMode::Foreground)
            .await;

        // Held until the poll is started so a concurrent close cannot land
        // between the check and the start.
        let modal = self.modal();
        if modal.as_ref().map(|m| m.id) != Some(id) {
            debug!("qr login: session {} for {} closed before it started", id, platform);
            return Ok(());
        }

        let payload = match started {
            Ok(payload) => payload,
            Err(e) => {
                warn!("qr login: start failed for {}: {}", platform, e);
                let failed = QrPayload {
                    error: Some(e.to_string()),
                    ..QrPayload::new(QrState::Error)
                };
                self.feed(id, platform, &session, &failed);
                return Ok(());
            }
        };

        if self.feed(id, platform, &session, &payload) == TickOutcome::Stop {
            return Ok(());
        }

        let me = self.clone();
        let platform = platform.to_string();
        self.inner.poll.start(self.inner.poll_interval, move || {
            let me = me.clone();
            let platform = platform.clone();
            let session = Arc::clone(&session);
            async move { me.poll_once(id, &platform, &session).await }
        });
        drop(modal);
        Ok(())
    }

    /// Close the dialog and stop polling.  Returns `false` if nothing was open.
    pub fn close(&self) -> bool {
        let closed = {
            let mut modal = self.modal();
            self.inner.poll.stop();
            modal.take()
        };
        match closed {
            Some(modal) => {
                debug!("qr login: dialog for {} closed", modal.platform);
                self.inner.ui.emit(UiEvent::QrClosed {
                    platform: modal.platform,
                });
                true
            }
            None => false,
        }
    }

    pub async fn logout(&self, platform: &str) -> Result<(), ClientError> {
        check_platform(platform)?;
        let request = ApiRequest::post("login/logout").query("platform", platform);
        let _: Value = self.inner.gateway.call(request, CallMode::Foreground).await?;

        self.set_login(platform, LoginState::default());
        if self.open_platform().as_deref() == Some(platform) {
            self.close();
        }
        info!("qr login: logged out of {}", platform);
        Ok(())
    }

    /// Ask the server who is logged in on `platform`.
    pub async fn refresh_status(&self, platform: &str) -> Result<LoginState, ClientError> {
        check_platform(platform)?;
        let request = ApiRequest::get("login/status").query("platform", platform);
        let status: LoginStatus = self.inner.gateway.call(request, CallMode::Silent).await?;
        let state = LoginState {
            logged_in: status.logged_in,
            nickname: status.nickname.unwrap_or_default(),
        };
        self.set_login(platform, state.clone());
        Ok(state)
    }

    /// Refresh every login platform; failures leave the previous state.
    pub async fn refresh_all(&self) {
        for platform in LOGIN_PLATFORMS {
            if let Err(e) = self.refresh_status(platform).await {
                debug!("qr login: status of {} unavailable: {}", platform, e);
            }
        }
    }

    async fn poll_once(
        &self,
        id: u64,
        platform: &str,
        session: &Arc<Mutex<QrSession>>,
    ) -> Result<TickOutcome, ClientError> {
        let request = ApiRequest::get("login/qr/poll").query("platform", platform);
        let payload: QrPayload = self.inner.gateway.call(request, CallMode::Silent).await?;
        Ok(self.feed(id, platform, session, &payload))
    }

    /// Run one payload through the session and execute the resulting
    /// commands.  The session is the one captured when polling started, so a
    /// response that lands after the dialog closed still applies to it.
    fn feed(
        &self,
        id: u64,
        platform: &str,
        session: &Mutex<QrSession>,
        payload: &QrPayload,
    ) -> TickOutcome {
        let commands = {
            let mut session = session.lock().unwrap_or_else(|e| e.into_inner());
            session.apply(payload)
        };
        debug!("qr login: {:?} -> {} command(s)", payload.state, commands.len());

        let mut outcome = TickOutcome::Continue;
        for command in commands {
            match command {
                QrCommand::ShowSpinner(status) => {
                    self.emit_view(platform, QrView::Spinner(status.text(platform)))
                }
                QrCommand::ShowImage(image) => self.emit_view(platform, QrView::Image(image)),
                QrCommand::ShowStatus(status) => {
                    self.emit_view(platform, QrView::Status(status.text(platform)))
                }
                QrCommand::ShowSuccess(status) => {
                    self.emit_view(platform, QrView::Success(status.text(platform)))
                }
                QrCommand::ShowError(message) => self.emit_view(platform, QrView::Error(message)),
                QrCommand::StopPolling => outcome = TickOutcome::Stop,
                QrCommand::MarkLoggedIn { nickname } => {
                    info!("qr login: logged in to {} as {:?}", platform, nickname);
                    self.set_login(
                        platform,
                        LoginState {
                            logged_in: true,
                            nickname,
                        },
                    );
                }
                QrCommand::ScheduleClose => self.schedule_close(id),
            }
        }
        outcome
    }

    fn schedule_close(&self, id: u64) {
        let me = self.clone();
        let delay = self.inner.close_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let current = me.modal().as_ref().map(|m| m.id);
            if current == Some(id) {
                me.close();
            }
        });
    }

    fn set_login(&self, platform: &str, state: LoginState) {
        self.inner.logins.set(platform, state.clone());
        self.inner.ui.emit(UiEvent::LoginChanged {
            platform: platform.to_string(),
            logged_in: state.logged_in,
            nickname: state.nickname,
        });
    }

    fn replace_modal(&self, modal: Modal) {
        let mut current = self.modal();
        self.inner.poll.stop();
        *current = Some(modal);
    }

    fn emit_view(&self, platform: &str, view: QrView) {
        self.inner.ui.emit(UiEvent::Qr {
            platform: platform.to_string(),
            view,
        });
    }

    fn modal(&self) -> std::sync::MutexGuard<'_, Option<Modal>> {
        self.inner.modal.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn check_platform(platform: &str) -> Result<(), ValidationError> {
    if LOGIN_PLATFORMS.contains(&platform) {
        Ok(())
    } else {
        Err(ValidationError::UnknownPlatform(platform.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::busy::BusyIndicator;
    use crate::testing::{ok_json, ScriptedTransport};
    use tokio::sync::mpsc::UnboundedReceiver;

    fn payload(state: QrState) -> QrPayload {
        QrPayload::new(state)
    }

    fn with_image(state: QrState, image: &str) -> QrPayload {
        QrPayload {
            qr_image: Some(image.to_string()),
            ..QrPayload::new(state)
        }
    }

    fn run(states: &[QrPayload]) -> (QrSession, Vec<QrCommand>) {
        let mut session = QrSession::new();
        let mut all = Vec::new();
        for p in states {
            all.extend(session.apply(p));
        }
        (session, all)
    }

    #[test]
    fn test_happy_path_stops_and_logs_in() {
        let (session, commands) = run(&[
            payload(QrState::Starting),
            with_image(QrState::WaitingScan, "img1"),
            payload(QrState::Scanned),
            QrPayload {
                nickname: Some("alice".into()),
                ..payload(QrState::Success)
            },
        ]);

        assert_eq!(session.state, QrState::Success);
        assert_eq!(
            commands,
            vec![
                QrCommand::ShowSpinner(QrStatus::Starting),
                QrCommand::ShowImage("img1".into()),
                QrCommand::ShowStatus(QrStatus::ScanWithApp),
                QrCommand::ShowStatus(QrStatus::ConfirmOnPhone),
                QrCommand::ShowSuccess(QrStatus::LoggedIn),
                QrCommand::StopPolling,
                QrCommand::MarkLoggedIn {
                    nickname: "alice".into()
                },
                QrCommand::ScheduleClose,
            ]
        );
    }

    #[test]
    fn test_expiry_keeps_polling_and_shows_new_image() {
        let states = [
            with_image(QrState::WaitingScan, "img1"),
            with_image(QrState::Expired, "img2"),
            with_image(QrState::WaitingScan, "img2"),
        ];
        let (session, commands) = run(&states);

        assert_eq!(session.state, QrState::WaitingScan);
        assert_eq!(session.image.as_deref(), Some("img2"));
        assert!(!commands.contains(&QrCommand::StopPolling));
        // The same image is not re-rendered
        let images: Vec<_> = commands
            .iter()
            .filter(|c| matches!(c, QrCommand::ShowImage(_)))
            .collect();
        assert_eq!(images.len(), 2);
    }

    #[test]
    fn test_error_uses_server_message_or_default() {
        let (session, commands) = run(&[QrPayload {
            error: Some("risk control".into()),
            ..payload(QrState::Error)
        }]);
        assert_eq!(session.error.as_deref(), Some("risk control"));
        assert_eq!(
            commands,
            vec![QrCommand::ShowError("risk control".into()), QrCommand::StopPolling]
        );

        let (_, commands) = run(&[payload(QrState::Error)]);
        assert_eq!(commands[0], QrCommand::ShowError(DEFAULT_ERROR.into()));
    }

    #[test]
    fn test_finished_session_ignores_payloads() {
        let mut session = QrSession::new();
        session.apply(&payload(QrState::Success));
        assert!(session.apply(&with_image(QrState::WaitingScan, "x")).is_empty());
        assert!(session.apply(&payload(QrState::Error)).is_empty());
        assert_eq!(session.state, QrState::Success);
    }

    // ── Controller ──────────────────────────────────────────────────────────

    fn controller() -> (QrLogin, Arc<ScriptedTransport>, UnboundedReceiver<UiEvent>) {
        let transport = ScriptedTransport::new();
        let gateway = RequestGateway::new(transport.clone(), BusyIndicator::new());
        let (ui, rx) = UiSink::channel();
        let mut config = Config::default();
        config.polling.qr_interval_ms = 100;
        config.ui.qr_close_delay_ms = 300;
        let login = QrLogin::new(gateway, ui, LoginBook::default(), &config);
        (login, transport, rx)
    }

    fn drain(rx: &mut UnboundedReceiver<UiEvent>) -> Vec<UiEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_polls_until_success_then_closes() {
        let (login, transport, mut rx) = controller();
        transport.respond("login/qr/start", ok_json(payload(QrState::Starting)));
        for p in [
            with_image(QrState::WaitingScan, "img"),
            payload(QrState::Scanned),
            QrPayload {
                nickname: Some("bob".into()),
                ..payload(QrState::Success)
            },
        ] {
            transport.respond("login/qr/poll", ok_json(p));
        }

        login.open("netease").await.unwrap();
        assert_eq!(login.open_platform().as_deref(), Some("netease"));

        // Immediate tick plus two intervals covers the three polls
        tokio::time::sleep(Duration::from_millis(210)).await;
        settle().await;
        assert!(!login.is_polling());
        assert_eq!(transport.count("login/qr/poll"), 3);
        assert_eq!(
            login.logins().get("netease"),
            LoginState {
                logged_in: true,
                nickname: "bob".into()
            }
        );

        // Nothing more is polled after success
        tokio::time::sleep(Duration::from_millis(500)).await;
        settle().await;
        assert_eq!(transport.count("login/qr/poll"), 3);
        assert_eq!(login.open_platform(), None);

        let events = drain(&mut rx);
        assert!(events.contains(&UiEvent::QrClosed {
            platform: "netease".into()
        }));
        assert!(events.contains(&UiEvent::LoginChanged {
            platform: "netease".into(),
            logged_in: true,
            nickname: "bob".into()
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_codes_keep_the_loop_alive() {
        let (login, transport, _rx) = controller();
        transport.respond("login/qr/start", ok_json(with_image(QrState::WaitingScan, "a")));
        for p in [
            with_image(QrState::WaitingScan, "a"),
            with_image(QrState::Expired, "b"),
            with_image(QrState::WaitingScan, "b"),
            payload(QrState::Success),
        ] {
            transport.respond("login/qr/poll", ok_json(p));
        }

        login.open("qq").await.unwrap();
        tokio::time::sleep(Duration::from_millis(210)).await;
        settle().await;
        assert!(login.is_polling());
        assert_eq!(login.session().map(|s| s.state), Some(QrState::WaitingScan));

        tokio::time::sleep(Duration::from_millis(100)).await;
        settle().await;
        assert!(!login.is_polling());
        assert!(login.logins().get("qq").logged_in);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_errors_are_retried() {
        let (login, transport, _rx) = controller();
        transport.respond("login/qr/start", ok_json(with_image(QrState::WaitingScan, "a")));
        transport.fail("login/qr/poll", ClientError::Transport("reset".into()));

        login.open("netease").await.unwrap();
        tokio::time::sleep(Duration::from_millis(210)).await;
        settle().await;
        assert!(login.is_polling());
        assert_eq!(transport.count("login/qr/poll"), 3);

        assert!(login.close());
        assert!(!login.is_polling());
        assert!(!login.close());
    }

    #[tokio::test(start_paused = true)]
    async fn test_logged_in_platform_shows_static_view() {
        let (login, transport, mut rx) = controller();
        login.logins().set(
            "netease",
            LoginState {
                logged_in: true,
                nickname: "carol".into(),
            },
        );

        login.open("netease").await.unwrap();
        assert!(transport.requests().is_empty());
        assert!(!login.is_polling());
        assert_eq!(
            drain(&mut rx),
            vec![UiEvent::Qr {
                platform: "netease".into(),
                view: QrView::LoggedIn {
                    nickname: "carol".into()
                }
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_failure_is_shown_in_dialog() {
        let (login, transport, mut rx) = controller();
        transport.fail("login/qr/start", ClientError::api(-1, Some("busy".into())));

        login.open("qq").await.unwrap();
        assert!(!login.is_polling());
        let events = drain(&mut rx);
        assert_eq!(
            events.last(),
            Some(&UiEvent::Qr {
                platform: "qq".into(),
                view: QrView::Error("busy".into())
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_during_start_never_polls() {
        let (login, transport, mut rx) = controller();
        transport.respond_after(
            "login/qr/start",
            Duration::from_millis(500),
            ok_json(with_image(QrState::WaitingScan, "a")),
        );
        transport.respond("login/qr/poll", ok_json(with_image(QrState::WaitingScan, "a")));

        let opening = {
            let login = login.clone();
            tokio::spawn(async move { login.open("netease").await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(login.open_platform().as_deref(), Some("netease"));
        assert!(login.close());

        opening.await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        settle().await;

        assert!(!login.is_polling());
        assert_eq!(login.open_platform(), None);
        assert_eq!(transport.count("login/qr/poll"), 0);
        let images = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, UiEvent::Qr { view: QrView::Image(_), .. }))
            .count();
        assert_eq!(images, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reopen_during_start_keeps_new_platform() {
        let (login, transport, _rx) = controller();
        transport.respond_for_after(
            "login/qr/start",
            "netease",
            Duration::from_millis(500),
            ok_json(with_image(QrState::WaitingScan, "n")),
        );
        transport.respond_for(
            "login/qr/start",
            "qq",
            ok_json(with_image(QrState::WaitingScan, "q")),
        );
        transport.respond_for(
            "login/qr/poll",
            "qq",
            ok_json(with_image(QrState::WaitingScan, "q")),
        );
        transport.respond_for("login/qr/poll", "netease", ok_json(payload(QrState::Success)));

        let first = {
            let login = login.clone();
            tokio::spawn(async move { login.open("netease").await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        login.open("qq").await.unwrap();
        first.await.unwrap().unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        settle().await;

        assert_eq!(login.open_platform().as_deref(), Some("qq"));
        assert!(login.is_polling());
        let polled: Vec<String> = transport
            .requests()
            .iter()
            .filter(|r| r.path == "login/qr/poll")
            .map(|r| r.query_value("platform").unwrap_or_default().to_string())
            .collect();
        assert!(!polled.is_empty());
        assert!(polled.iter().all(|p| p == "qq"), "polled {:?}", polled);
        assert!(!login.logins().get("netease").logged_in);
        assert_eq!(login.session().and_then(|s| s.image).as_deref(), Some("q"));
        login.close();
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_answer_after_close_still_applies_to_its_session() {
        let (login, transport, mut rx) = controller();
        transport.respond("login/qr/start", ok_json(with_image(QrState::WaitingScan, "a")));
        transport.respond_after(
            "login/qr/poll",
            Duration::from_millis(50),
            ok_json(QrPayload {
                nickname: Some("frank".into()),
                ..payload(QrState::Success)
            }),
        );

        login.open("netease").await.unwrap();
        // First poll is in flight
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(login.close());

        tokio::time::sleep(Duration::from_millis(100)).await;
        settle().await;
        assert!(login.logins().get("netease").logged_in);
        assert!(!login.is_polling());
        assert_eq!(transport.count("login/qr/poll"), 1);

        // The delayed auto-close belongs to a dialog that is already gone
        tokio::time::sleep(Duration::from_millis(500)).await;
        settle().await;
        assert_eq!(login.open_platform(), None);
        let closes = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, UiEvent::QrClosed { .. }))
            .count();
        assert_eq!(closes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_closes_matching_dialog() {
        let (login, transport, mut rx) = controller();
        login.logins().set(
            "qq",
            LoginState {
                logged_in: true,
                nickname: "dave".into(),
            },
        );
        transport.respond("login/logout", ok_json(Value::Null));

        login.open("qq").await.unwrap();
        login.logout("qq").await.unwrap();

        assert_eq!(login.open_platform(), None);
        assert!(!login.logins().get("qq").logged_in);
        assert!(drain(&mut rx).contains(&UiEvent::QrClosed {
            platform: "qq".into()
        }));
    }

    #[tokio::test]
    async fn test_unknown_platform_is_rejected_before_any_call() {
        let (login, transport, _rx) = controller();
        let err = login.open("spotify").await.unwrap_err();
        assert_eq!(
            err,
            ClientError::Validation(ValidationError::UnknownPlatform("spotify".into()))
        );
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_status_updates_book() {
        let (login, transport, _rx) = controller();
        transport.respond(
            "login/status",
            ok_json(LoginStatus {
                logged_in: true,
                nickname: Some("erin".into()),
            }),
        );
        let state = login.refresh_status("netease").await.unwrap();
        assert_eq!(state.nickname, "erin");
        assert!(login.logins().get("netease").logged_in);
    }
}
