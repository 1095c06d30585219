//! Turn coordinator
//!
//! Owns the capture channel, the playback channel and the floor. Capture and
//! playback are never active together: entering `Speaking` stops capture
//! first, and capture is only opened from `Idle` after the agent has
//! finished. Timers are exposed as deadlines for the caller's event loop.

use super::{FloorState, SharedFloor};
use crate::capture::{CaptureChannel, CaptureEvent, DedupGuard, PendingUtterance};
use crate::integration::TimingConfig;
use crate::playback::{PlaybackChannel, PlaybackProgress, SourceTier, VoiceSelection};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Reports from a playback task, tagged with the speech id
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechEvent {
    Progress { id: u64, progress: PlaybackProgress },
    Finished { id: u64, tier: SourceTier },
}

/// Receivers the caller's event loop selects over
pub struct FloorEvents {
    pub capture: UnboundedReceiver<CaptureEvent>,
    pub speech: UnboundedReceiver<SpeechEvent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenOutcome {
    /// Floor was not idle; nothing changed
    Busy,
    Listening,
    /// Listening for typed input only
    TextMode,
    /// The microphone just became unusable; tell the user
    MicrophoneUnavailable,
}

/// What a capture event means for the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureSignal {
    Ignored,
    /// Live transcript of the utterance in progress
    Interim(String),
    /// The microphone just became unusable; tell the user
    MicrophoneUnavailable,
}

pub struct TurnCoordinator {
    capture: CaptureChannel,
    playback: Arc<PlaybackChannel>,
    floor: SharedFloor,
    pending: PendingUtterance,
    dedup: DedupGuard,
    timing: TimingConfig,
    speech_tx: UnboundedSender<SpeechEvent>,
    speaking: Option<(u64, JoinHandle<()>)>,
    next_speech_id: u64,
    resume_at: Option<Instant>,
    restart_at: Option<Instant>,
}

impl TurnCoordinator {
    pub fn new(
        capture: (CaptureChannel, UnboundedReceiver<CaptureEvent>),
        playback: Arc<PlaybackChannel>,
        floor: SharedFloor,
        timing: TimingConfig,
    ) -> (Self, FloorEvents) {
        let (capture, capture_rx) = capture;
        let (speech_tx, speech_rx) = mpsc::unbounded_channel();
        floor.set(FloorState::Idle);

        let coordinator = Self {
            capture,
            playback,
            floor,
            pending: PendingUtterance::new(timing.silence_timeout()),
            dedup: DedupGuard::new(timing.duplicate_window(), timing.echo_min_chars),
            timing,
            speech_tx,
            speaking: None,
            next_speech_id: 1,
            resume_at: None,
            restart_at: None,
        };
        (
            coordinator,
            FloorEvents {
                capture: capture_rx,
                speech: speech_rx,
            },
        )
    }

    pub fn floor(&self) -> &SharedFloor {
        &self.floor
    }

    pub fn state(&self) -> FloorState {
        self.floor.get()
    }

    pub fn is_text_mode(&self) -> bool {
        self.capture.is_text_mode()
    }

    pub fn playback(&self) -> &Arc<PlaybackChannel> {
        &self.playback
    }

    /// Take the floor and speak `text`. Completion arrives as
    /// [`SpeechEvent::Finished`] with the returned id.
    pub fn request_speak(&mut self, text: String, voice: VoiceSelection, muted: bool) -> u64 {
        self.capture.stop(true);
        self.pending.clear();
        self.resume_at = None;
        self.restart_at = None;
        self.cancel_speech();

        self.dedup.note_agent_line(&text);
        let id = self.next_speech_id;
        self.next_speech_id += 1;
        self.floor.set(FloorState::Speaking);

        let tx = self.speech_tx.clone();
        if muted {
            debug!("Speech {} muted", id);
            let _ = tx.send(SpeechEvent::Finished {
                id,
                tier: SourceTier::None,
            });
            return id;
        }

        let playback = self.playback.clone();
        let task = tokio::spawn(async move {
            let progress_tx = tx.clone();
            let report = move |progress: PlaybackProgress| {
                let _ = progress_tx.send(SpeechEvent::Progress { id, progress });
            };
            let tier = playback.speak(&text, &voice, &report).await;
            let _ = tx.send(SpeechEvent::Finished { id, tier });
        });
        self.speaking = Some((id, task));
        debug!("Speech {} started", id);
        id
    }

    fn is_current(&self, id: u64) -> bool {
        self.floor.get().agent_holds() && self.next_speech_id == id + 1
    }

    /// Apply a playback progress report. Returns `false` for stale reports.
    pub fn on_speech_progress(&mut self, id: u64, progress: &PlaybackProgress) -> bool {
        if !self.is_current(id) {
            return false;
        }
        match progress {
            PlaybackProgress::AwaitingUnlock => self.floor.set(FloorState::PendingUnlock),
            PlaybackProgress::Unlocked | PlaybackProgress::RemoteUnavailable(_) => {
                if self.floor.get() == FloorState::PendingUnlock {
                    self.floor.set(FloorState::Speaking);
                }
            }
            PlaybackProgress::Silent => {}
        }
        true
    }

    /// Playback `id` finished. Releases the floor and, with `listen_after`,
    /// schedules capture after the echo grace delay. Returns `false` for a
    /// stale id.
    pub fn finish_speaking(&mut self, id: u64, listen_after: bool, now: Instant) -> bool {
        if !self.is_current(id) {
            debug!("Stale speech {} finished", id);
            return false;
        }
        self.speaking = None;
        self.floor.set(FloorState::Idle);
        if listen_after {
            self.resume_at = Some(now + self.timing.echo_grace());
        }
        true
    }

    /// Drop a scheduled resume, e.g. when the session left the interactive phases
    pub fn cancel_resume(&mut self) {
        self.resume_at = None;
    }

    /// Open the floor to the candidate. No-op unless idle.
    pub fn request_listen(&mut self, now: Instant) -> ListenOutcome {
        self.resume_at = None;
        if !self.floor.get().is_idle() {
            return ListenOutcome::Busy;
        }
        self.pending.clear();
        self.floor.set(FloorState::Listening);
        self.open_capture(now)
    }

    fn open_capture(&mut self, now: Instant) -> ListenOutcome {
        if self.capture.is_text_mode() {
            return ListenOutcome::TextMode;
        }
        match self.capture.start() {
            Ok(()) => ListenOutcome::Listening,
            Err(e) if e.is_capture_fatal() => {
                if self.capture.enter_text_mode() {
                    ListenOutcome::MicrophoneUnavailable
                } else {
                    ListenOutcome::TextMode
                }
            }
            Err(e) => {
                warn!("Capture failed to start ({}), retrying", e);
                self.restart_at = Some(now + self.timing.capture_restart());
                ListenOutcome::Listening
            }
        }
    }

    /// Reopen capture that ended while the candidate still had the floor
    pub fn restart_capture(&mut self, now: Instant) -> ListenOutcome {
        self.restart_at = None;
        if !self.floor.get().is_listening() {
            return ListenOutcome::Busy;
        }
        debug!("Restarting capture");
        self.open_capture(now)
    }

    pub fn on_capture_event(&mut self, event: CaptureEvent, now: Instant) -> CaptureSignal {
        match event {
            CaptureEvent::Fragment(fragment) => {
                if !self.floor.get().is_listening() || !self.capture.is_active() {
                    debug!("Stray fragment {:?} dropped", fragment.text);
                    return CaptureSignal::Ignored;
                }
                self.pending.push(fragment, now);
                CaptureSignal::Interim(self.pending.preview())
            }
            CaptureEvent::Ended => {
                if self.capture.on_ended() && self.floor.get().is_listening() {
                    self.restart_at = Some(now + self.timing.capture_restart());
                }
                CaptureSignal::Ignored
            }
            CaptureEvent::Failed(failure) => {
                if failure.is_fatal() {
                    if self.capture.enter_text_mode() {
                        return CaptureSignal::MicrophoneUnavailable;
                    }
                } else if failure.is_recoverable() {
                    debug!("Capture interrupted: {:?}", failure);
                } else {
                    warn!("Capture error: {:?}", failure);
                }
                CaptureSignal::Ignored
            }
        }
    }

    /// Silence deadline reached. Returns the utterance if it is complete
    /// and passes duplicate/echo screening.
    pub fn on_silence(&mut self, now: Instant) -> Option<String> {
        if !self.floor.get().is_listening() {
            self.pending.clear();
            return None;
        }
        let text = self.pending.take_if_due(now)?;
        if self.dedup.accept(&text, now) {
            Some(text)
        } else {
            None
        }
    }

    /// Screen typed input. Accepted whenever the agent does not hold the floor.
    pub fn screen_typed(&mut self, text: &str, now: Instant) -> bool {
        if self.floor.get().agent_holds() {
            debug!("Typed input while agent speaking dropped");
            return false;
        }
        if self.dedup.accept(text, now) {
            self.pending.clear();
            true
        } else {
            false
        }
    }

    /// Candidate is done; close capture and go idle while the next line is prepared
    pub fn release_floor(&mut self) {
        self.capture.stop(true);
        self.pending.clear();
        self.resume_at = None;
        self.restart_at = None;
        if !self.floor.get().agent_holds() {
            self.floor.set(FloorState::Idle);
        }
    }

    fn cancel_speech(&mut self) {
        if let Some((id, task)) = self.speaking.take() {
            debug!("Abandoning speech {}", id);
            task.abort();
            self.playback.halt();
        }
    }

    /// Forward the user's "enable audio" gesture. Returns `false` if no
    /// playback is waiting for it.
    pub fn retry_unlock(&self) -> bool {
        if self.floor.get() == FloorState::PendingUnlock {
            self.playback.retry_unlock();
            true
        } else {
            false
        }
    }

    /// Hard stop: capture, playback, timers and any pending utterance
    pub fn abort_all(&mut self) {
        self.cancel_speech();
        self.capture.stop(true);
        self.pending.clear();
        self.resume_at = None;
        self.restart_at = None;
        self.floor.set(FloorState::Idle);
        info!("Floor reset");
    }

    /// [`abort_all`](Self::abort_all) plus forgetting per-session state
    pub fn reset_session(&mut self) {
        self.abort_all();
        self.dedup.reset();
        self.capture.reset();
    }

    pub fn silence_deadline(&self) -> Option<Instant> {
        if self.floor.get().is_listening() {
            self.pending.deadline()
        } else {
            None
        }
    }

    pub fn resume_deadline(&self) -> Option<Instant> {
        self.resume_at
    }

    pub fn restart_deadline(&self) -> Option<Instant> {
        self.restart_at
    }
}

impl Drop for TurnCoordinator {
    fn drop(&mut self) {
        self.cancel_speech();
        self.capture.stop(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CaptureFailure, Fragment, SpeechRecognizer};
    use crate::{Result, VivaError};
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct Mic {
        active: Arc<Mutex<bool>>,
        deny: bool,
    }

    impl SpeechRecognizer for Mic {
        fn start(&mut self, _events: UnboundedSender<CaptureEvent>) -> Result<()> {
            if self.deny {
                return Err(VivaError::PermissionDenied("denied".into()));
            }
            *self.active.lock() = true;
            Ok(())
        }

        fn stop(&mut self) {
            *self.active.lock() = false;
        }
    }

    fn coordinator(mic: Mic) -> (TurnCoordinator, FloorEvents) {
        TurnCoordinator::new(
            CaptureChannel::new(Some(Box::new(mic))),
            Arc::new(PlaybackChannel::silent()),
            SharedFloor::new(),
            TimingConfig::default(),
        )
    }

    async fn finish(coordinator: &mut TurnCoordinator, events: &mut FloorEvents) -> u64 {
        loop {
            match events.speech.recv().await {
                Some(SpeechEvent::Finished { id, .. }) => {
                    assert!(coordinator.finish_speaking(id, true, Instant::now()));
                    return id;
                }
                Some(SpeechEvent::Progress { id, progress }) => {
                    coordinator.on_speech_progress(id, &progress);
                }
                None => panic!("speech channel closed"),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_speaking_stops_capture_and_discards_pending() {
        let mic = Mic::default();
        let (mut coordinator, _events) = coordinator(mic.clone());
        let now = Instant::now();
        assert_eq!(coordinator.request_listen(now), ListenOutcome::Listening);
        assert!(*mic.active.lock());
        coordinator.on_capture_event(CaptureEvent::Fragment(Fragment::finalized("half an")), now);
        assert!(coordinator.silence_deadline().is_some());

        coordinator.request_speak("Next question".into(), VoiceSelection::default(), false);
        assert!(!*mic.active.lock());
        assert_eq!(coordinator.state(), FloorState::Speaking);
        assert!(coordinator.silence_deadline().is_none());
        assert_eq!(coordinator.on_silence(now + Duration::from_secs(10)), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_listen_is_noop_unless_idle() {
        let mic = Mic::default();
        let (mut coordinator, _events) = coordinator(mic.clone());
        coordinator.request_speak("Hello".into(), VoiceSelection::default(), true);
        assert_eq!(coordinator.request_listen(Instant::now()), ListenOutcome::Busy);
        assert!(!*mic.active.lock());
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_after_grace_delay() {
        let (mut coordinator, mut events) = coordinator(Mic::default());
        coordinator.request_speak("Hello".into(), VoiceSelection::default(), false);
        let before = Instant::now();
        finish(&mut coordinator, &mut events).await;
        assert_eq!(coordinator.state(), FloorState::Idle);
        let resume = coordinator.resume_deadline().unwrap();
        assert_eq!(resume - before, Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_fragments_dropped_while_speaking() {
        let (mut coordinator, _events) = coordinator(Mic::default());
        coordinator.request_speak("Hello".into(), VoiceSelection::default(), true);
        let signal = coordinator.on_capture_event(
            CaptureEvent::Fragment(Fragment::finalized("late words")),
            Instant::now(),
        );
        assert_eq!(signal, CaptureSignal::Ignored);
    }

    #[tokio::test(start_paused = true)]
    async fn test_utterance_after_silence() {
        let (mut coordinator, _events) = coordinator(Mic::default());
        let t0 = Instant::now();
        coordinator.request_listen(t0);
        coordinator.on_capture_event(CaptureEvent::Fragment(Fragment::finalized("I led")), t0);
        let signal = coordinator.on_capture_event(
            CaptureEvent::Fragment(Fragment::interim("a team")),
            t0 + Duration::from_millis(300),
        );
        assert_eq!(signal, CaptureSignal::Interim("I led a team".into()));

        let deadline = coordinator.silence_deadline().unwrap();
        assert_eq!(
            coordinator.on_silence(deadline).as_deref(),
            Some("I led a team")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unexpected_end_schedules_restart() {
        let mic = Mic::default();
        let (mut coordinator, _events) = coordinator(mic.clone());
        let t0 = Instant::now();
        coordinator.request_listen(t0);
        *mic.active.lock() = false;
        coordinator.on_capture_event(CaptureEvent::Ended, t0);
        assert_eq!(
            coordinator.restart_deadline(),
            Some(t0 + Duration::from_millis(300))
        );
        assert_eq!(
            coordinator.restart_capture(t0 + Duration::from_millis(300)),
            ListenOutcome::Listening
        );
        assert!(*mic.active.lock());
    }

    #[tokio::test(start_paused = true)]
    async fn test_permission_denied_signalled_once() {
        let mic = Mic {
            deny: true,
            ..Default::default()
        };
        let (mut coordinator, _events) = coordinator(mic);
        let now = Instant::now();
        assert_eq!(coordinator.request_listen(now), ListenOutcome::MicrophoneUnavailable);
        assert!(coordinator.is_text_mode());
        assert_eq!(coordinator.state(), FloorState::Listening);

        coordinator.release_floor();
        assert_eq!(coordinator.request_listen(now), ListenOutcome::TextMode);
        assert_eq!(
            coordinator.on_capture_event(CaptureEvent::Failed(CaptureFailure::PermissionDenied), now),
            CaptureSignal::Ignored
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_runtime_permission_failure_enters_text_mode() {
        let (mut coordinator, _events) = coordinator(Mic::default());
        let now = Instant::now();
        coordinator.request_listen(now);
        assert_eq!(
            coordinator.on_capture_event(CaptureEvent::Failed(CaptureFailure::DeviceUnavailable), now),
            CaptureSignal::MicrophoneUnavailable
        );
        assert_eq!(
            coordinator.on_capture_event(CaptureEvent::Failed(CaptureFailure::NoSpeech), now),
            CaptureSignal::Ignored
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_typed_echo_and_duplicates_rejected() {
        let (mut coordinator, mut events) = coordinator(Mic::default());
        coordinator.request_speak(
            "Tell me about a challenge you faced at work.".into(),
            VoiceSelection::default(),
            true,
        );
        let now = Instant::now();
        assert!(!coordinator.screen_typed("typed too early", now));
        finish(&mut coordinator, &mut events).await;

        assert!(!coordinator.screen_typed("tell me about a challenge you faced at work", now));
        assert!(coordinator.screen_typed("I led a team of five engineers", now));
        assert!(!coordinator.screen_typed(
            "I led a team of five engineers",
            now + Duration::from_secs(1)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_all_resets_everything() {
        let mic = Mic::default();
        let (mut coordinator, mut events) = coordinator(mic.clone());
        let id = coordinator.request_speak("Hello".into(), VoiceSelection::default(), false);
        coordinator.abort_all();
        assert_eq!(coordinator.state(), FloorState::Idle);
        assert!(coordinator.resume_deadline().is_none());
        assert!(!*mic.active.lock());
        assert!(!coordinator.finish_speaking(id, true, Instant::now()));
        // The aborted task never reports
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(events.speech.try_recv().is_err());
    }
}
