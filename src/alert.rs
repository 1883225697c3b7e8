//! The panic alert flow.
//!
//! One tap turns into a location-aware emergency notification:
//!
//! 1. ask for location permission
//! 2. take a one-shot position fix
//! 3. compose a text with a map link, accuracy, agent and emergency contacts
//! 4. open the SMS composer with that text
//! 5. after a fixed delay, dial the agent
//!
//! ```text
//! Idle --tap--> Locating --fix--> Active --"I'm safe"--> Idle
//!                  |
//!                  +--denied / no fix--> Idle
//! ```
//!
//! Opening links is best-effort: a failed SMS open is logged and never blocks
//! the dial. The delayed dial is held as an abortable task so that at most one
//! dial is ever pending. "I'm safe" during a trigger voids that trigger's dial,
//! and a trigger dropped mid-flight leaves the flow idle.

use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::model::User;

/// Header line of every alert text.
pub const ALERT_HEADER: &str = "🚨 EMERGENCY ALERT 🚨";

/// Agent label used when the user has none.
const UNKNOWN_AGENT: &str = "Unknown";

/// Default wait between opening the SMS composer and dialing.
pub const DEFAULT_DIAL_DELAY: Duration = Duration::from_millis(2500);

/// Default upper bound on the position fix.
pub const DEFAULT_FIX_TIMEOUT: Duration = Duration::from_secs(15);

/// A single position reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    pub latitude: f64,
    pub longitude: f64,
    /// Accuracy radius in meters.
    pub accuracy: f64,
}

/// Device location capability.
pub trait LocationProvider: Send + Sync {
    /// Ask for permission. Resolves once the user answers.
    fn request_permission(&self) -> impl Future<Output = bool> + Send;

    /// Take one high-accuracy position fix.
    fn current_fix(&self) -> impl Future<Output = Result<LocationFix>> + Send;
}

/// Device URI-open capability (`sms:`, `tel:`).
pub trait SystemLinker: Send + Sync + 'static {
    fn open(&self, uri: &str) -> impl Future<Output = Result<()>> + Send;
}

/// The SMS deep-link dialect of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Ios,
    #[default]
    Android,
}

impl Platform {
    /// Separator between the recipient and the `body` parameter.
    fn body_separator(&self) -> char {
        match self {
            Platform::Ios => '&',
            Platform::Android => '?',
        }
    }
}

/// Where the flow is in its state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PanicState {
    Idle,
    Locating,
    /// The alert was dispatched; the agent dial may still be pending.
    Active,
}

/// Settings that stay fixed for the lifetime of a flow.
#[derive(Debug, Clone)]
pub struct PanicSettings {
    pub platform: Platform,
    /// Fixed SMS recipient. `None` opens the composer without one.
    pub sms_recipient: Option<String>,
    pub dial_delay: Duration,
    pub fix_timeout: Duration,
}

impl Default for PanicSettings {
    fn default() -> Self {
        Self {
            platform: Platform::default(),
            sms_recipient: None,
            dial_delay: DEFAULT_DIAL_DELAY,
            fix_timeout: DEFAULT_FIX_TIMEOUT,
        }
    }
}

/// One trigger of the flow.
#[derive(Debug, Clone)]
pub struct PanicRequest {
    /// The session user. When absent the text degrades to blank fields.
    pub user: Option<User>,
    /// Number dialed after the delay.
    pub dial_number: String,
}

/// What a successful trigger sent out.
#[derive(Debug, Clone, Serialize)]
pub struct PanicDispatch {
    pub fix: LocationFix,
    pub map_link: String,
    pub message: String,
    pub sms_uri: String,
    pub dial_uri: String,
    /// Whether the SMS composer opened. The dial is scheduled either way.
    pub sms_opened: bool,
    /// False when the alert was canceled before the dial could be scheduled,
    /// or when there is no number to dial.
    pub dial_scheduled: bool,
}

#[derive(Debug)]
struct FlowState {
    phase: PanicState,
    pending_dial: Option<JoinHandle<()>>,
    /// Bumped by every trigger and every cancel. A trigger only schedules its
    /// dial while the generation it started with is still current.
    generation: u64,
}

impl FlowState {
    /// Abort the pending dial. Returns whether it had not fired yet.
    fn abort_dial(&mut self) -> bool {
        match self.pending_dial.take() {
            Some(handle) => {
                let pending = !handle.is_finished();
                handle.abort();
                pending
            }
            None => false,
        }
    }
}

fn lock(state: &StdMutex<FlowState>) -> MutexGuard<'_, FlowState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Puts the flow back to idle if a trigger ends without dispatching,
/// including when its future is dropped.
struct TriggerGuard<'a> {
    state: &'a StdMutex<FlowState>,
    generation: u64,
    armed: bool,
}

impl TriggerGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for TriggerGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = lock(self.state);
        if state.generation == self.generation {
            state.phase = PanicState::Idle;
        }
    }
}

/// Runs the panic sequence against a [`SystemLinker`].
///
/// Triggers are serialized: a second tap waits for the first to finish, then
/// replaces its pending dial instead of adding another one.
pub struct PanicFlow<L> {
    linker: Arc<L>,
    settings: PanicSettings,
    state: StdMutex<FlowState>,
    trigger_lock: Mutex<()>,
}

impl<L: SystemLinker> PanicFlow<L> {
    pub fn new(linker: L, settings: PanicSettings) -> Self {
        Self {
            linker: Arc::new(linker),
            settings,
            state: StdMutex::new(FlowState {
                phase: PanicState::Idle,
                pending_dial: None,
                generation: 0,
            }),
            trigger_lock: Mutex::new(()),
        }
    }

    pub fn linker(&self) -> &L {
        &self.linker
    }

    pub fn settings(&self) -> &PanicSettings {
        &self.settings
    }

    pub async fn state(&self) -> PanicState {
        lock(&self.state).phase
    }

    /// Whether a delayed dial is scheduled and has not fired yet.
    pub async fn has_pending_dial(&self) -> bool {
        lock(&self.state)
            .pending_dial
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Run the alert sequence.
    ///
    /// Fails with [`Error::PermissionDenied`] or [`Error::LocationUnavailable`]
    /// before anything is opened; the flow is back to idle in both cases.
    ///
    /// A [`cancel`](Self::cancel) while the trigger is still locating or
    /// opening the SMS composer leaves the flow idle and no dial is scheduled.
    pub async fn trigger<P: LocationProvider>(
        &self,
        location: &P,
        request: PanicRequest,
    ) -> Result<PanicDispatch> {
        let _serial = self.trigger_lock.lock().await;

        let generation = {
            let mut state = lock(&self.state);
            if state.abort_dial() {
                info!("Replacing pending agent dial");
            }
            state.phase = PanicState::Locating;
            state.generation = state.generation.wrapping_add(1);
            state.generation
        };
        let guard = TriggerGuard {
            state: &self.state,
            generation,
            armed: true,
        };

        let fix = match self.locate(location).await {
            Ok(fix) => fix,
            Err(e) => {
                warn!(error = %e, "Panic alert aborted");
                return Err(e);
            }
        };

        let map_link = map_link(&fix);
        let message = compose_message(request.user.as_ref(), &fix, &map_link);
        let sms_uri = sms_uri(
            self.settings.platform,
            self.settings.sms_recipient.as_deref(),
            &message,
        );
        let dial_uri = tel_uri(&request.dial_number);

        let sms_opened = match self.linker.open(&sms_uri).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "SMS composer did not open");
                false
            }
        };

        let has_number = !request.dial_number.trim().is_empty();
        if !has_number {
            warn!("No agent number configured, skipping dial");
        }

        let dial_scheduled = {
            let mut state = lock(&self.state);
            if state.generation == generation {
                state.phase = PanicState::Active;
                if has_number {
                    state.pending_dial = Some(self.schedule_dial(dial_uri.clone()));
                }
                has_number
            } else {
                info!("Panic alert canceled before dialing");
                false
            }
        };
        guard.disarm();

        info!(
            sms_opened,
            dial_scheduled,
            accuracy = fix.accuracy,
            dial_delay_ms = self.settings.dial_delay.as_millis() as u64,
            "Panic alert dispatched"
        );

        Ok(PanicDispatch {
            fix,
            map_link,
            message,
            sms_uri,
            dial_uri,
            sms_opened,
            dial_scheduled,
        })
    }

    /// "I'm safe": back to idle and drop any pending dial.
    ///
    /// Returns whether a dial was stopped, either one already scheduled or
    /// one a trigger in flight was about to schedule.
    pub async fn cancel(&self) -> bool {
        let mut state = lock(&self.state);
        let in_flight = state.phase == PanicState::Locating;
        state.phase = PanicState::Idle;
        state.generation = state.generation.wrapping_add(1);
        let aborted = state.abort_dial() || in_flight;
        if aborted {
            info!("Pending agent dial canceled");
        }
        aborted
    }

    /// Dial `number` right away, replacing any pending delayed dial.
    ///
    /// Fails with [`Error::LinkOpenFailed`] when `number` is blank.
    pub async fn call_agent_now(&self, number: &str) -> Result<()> {
        if number.trim().is_empty() {
            return Err(Error::LinkOpenFailed(
                "no agent number configured".to_string(),
            ));
        }
        lock(&self.state).abort_dial();
        self.linker.open(&tel_uri(number)).await
    }

    async fn locate<P: LocationProvider>(&self, location: &P) -> Result<LocationFix> {
        if !location.request_permission().await {
            return Err(Error::PermissionDenied);
        }

        match tokio::time::timeout(self.settings.fix_timeout, location.current_fix()).await {
            Ok(Ok(fix)) => Ok(fix),
            Ok(Err(Error::LocationUnavailable(reason))) => Err(Error::LocationUnavailable(reason)),
            Ok(Err(other)) => Err(Error::LocationUnavailable(other.to_string())),
            Err(_) => Err(Error::LocationUnavailable(format!(
                "no fix within {}s",
                self.settings.fix_timeout.as_secs()
            ))),
        }
    }

    fn schedule_dial(&self, uri: String) -> JoinHandle<()> {
        let linker = Arc::clone(&self.linker);
        let delay = self.settings.dial_delay;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match linker.open(&uri).await {
                Ok(()) => info!("Agent dial opened"),
                Err(e) => warn!(error = %e, "Agent dial did not open"),
            }
        })
    }
}

/// Map link for a position fix.
pub fn map_link(fix: &LocationFix) -> String {
    format!(
        "https://maps.google.com/?q={},{}",
        fix.latitude, fix.longitude
    )
}

/// Plain-text alert body.
///
/// Without a user the name is blank and the agent reads "Unknown".
pub fn compose_message(user: Option<&User>, fix: &LocationFix, map_link: &str) -> String {
    let name = user.map(User::full_name).unwrap_or_default();
    let agent = user
        .and_then(|u| u.agent.as_deref())
        .filter(|a| !a.is_empty())
        .unwrap_or(UNKNOWN_AGENT);
    let contacts = user
        .map(|u| {
            u.emergency_contacts
                .iter()
                .map(|c| format!("{}: {}", c.name, c.phone))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default();

    [
        ALERT_HEADER.to_string(),
        format!("{name} has triggered the panic button."),
        format!("Location: {map_link}"),
        format!("Accuracy: {:.0} meters", fix.accuracy),
        format!("Agent: {agent}"),
        format!("Contacts:\n{contacts}"),
    ]
    .join("\n\n")
}

/// `sms:` deep link with a percent-encoded body.
pub fn sms_uri(platform: Platform, recipient: Option<&str>, body: &str) -> String {
    format!(
        "sms:{}{}body={}",
        recipient.unwrap_or_default(),
        platform.body_separator(),
        urlencoding::encode(body)
    )
}

pub fn tel_uri(number: &str) -> String {
    format!("tel:{number}")
}
