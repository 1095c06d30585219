//! Scripted devices and services for driving a full interviewer in tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use viva::capture::{CaptureEvent, CaptureFailure, Fragment, SpeechRecognizer};
use viva::content::{ContentContext, ContentService, Evaluation};
use viva::integration::{InterviewEvent, InterviewHandle};
use viva::playback::{AssetHandle, AudioSink, LocalSpeech, VoiceSynthesizer};
use viva::session::{EvaluationResult, Language, Phase, Question, Summary, Turn};
use viva::turn::FloorState;
use viva::{Result, VivaError};

/// Records device activity and counts any moment capture and playback overlap
#[derive(Clone, Default)]
pub struct DeviceProbe {
    capture: Arc<AtomicBool>,
    playback: Arc<AtomicBool>,
    violations: Arc<AtomicUsize>,
    plays: Arc<AtomicUsize>,
}

impl DeviceProbe {
    pub fn capture_on(&self) {
        if self.playback.load(Ordering::SeqCst) {
            self.violations.fetch_add(1, Ordering::SeqCst);
        }
        self.capture.store(true, Ordering::SeqCst);
    }

    pub fn capture_off(&self) {
        self.capture.store(false, Ordering::SeqCst);
    }

    pub fn playback_on(&self) {
        if self.capture.load(Ordering::SeqCst) {
            self.violations.fetch_add(1, Ordering::SeqCst);
        }
        self.plays.fetch_add(1, Ordering::SeqCst);
        self.playback.store(true, Ordering::SeqCst);
    }

    pub fn playback_off(&self) {
        self.playback.store(false, Ordering::SeqCst);
    }

    pub fn is_capturing(&self) -> bool {
        self.capture.load(Ordering::SeqCst)
    }

    pub fn violations(&self) -> usize {
        self.violations.load(Ordering::SeqCst)
    }

    pub fn plays(&self) -> usize {
        self.plays.load(Ordering::SeqCst)
    }
}

/// Test-side end of a [`MockRecognizer`]: speak into the microphone
#[derive(Clone, Default)]
pub struct MicFeed {
    events: Arc<Mutex<Option<UnboundedSender<CaptureEvent>>>>,
    /// Sender kept after stop, to deliver late events
    last: Arc<Mutex<Option<UnboundedSender<CaptureEvent>>>>,
    starts: Arc<AtomicUsize>,
}

impl MicFeed {
    fn send(&self, event: CaptureEvent) -> bool {
        match self.events.lock().as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    /// A complete phrase, delivered only while recognition runs
    pub fn say(&self, text: &str) -> bool {
        self.send(CaptureEvent::Fragment(Fragment::finalized(text)))
    }

    pub fn interim(&self, text: &str) -> bool {
        self.send(CaptureEvent::Fragment(Fragment::interim(text)))
    }

    pub fn fail(&self, failure: CaptureFailure) -> bool {
        self.send(CaptureEvent::Failed(failure))
    }

    pub fn end(&self) -> bool {
        self.send(CaptureEvent::Ended)
    }

    /// Fragment delivered even though recognition was stopped
    pub fn say_late(&self, text: &str) -> bool {
        match self.last.lock().as_ref() {
            Some(tx) => tx
                .send(CaptureEvent::Fragment(Fragment::finalized(text)))
                .is_ok(),
            None => false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.events.lock().is_some()
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }
}

pub struct MockRecognizer {
    feed: MicFeed,
    probe: DeviceProbe,
    deny: bool,
}

impl MockRecognizer {
    pub fn new(probe: &DeviceProbe) -> (Box<dyn SpeechRecognizer>, MicFeed) {
        let feed = MicFeed::default();
        let recognizer = MockRecognizer {
            feed: feed.clone(),
            probe: probe.clone(),
            deny: false,
        };
        (Box::new(recognizer), feed)
    }

    /// Recognizer whose microphone permission is denied
    pub fn denied(probe: &DeviceProbe) -> (Box<dyn SpeechRecognizer>, MicFeed) {
        let feed = MicFeed::default();
        let recognizer = MockRecognizer {
            feed: feed.clone(),
            probe: probe.clone(),
            deny: true,
        };
        (Box::new(recognizer), feed)
    }
}

impl SpeechRecognizer for MockRecognizer {
    fn start(&mut self, events: UnboundedSender<CaptureEvent>) -> Result<()> {
        if self.deny {
            return Err(VivaError::PermissionDenied("microphone blocked".into()));
        }
        self.probe.capture_on();
        self.feed.starts.fetch_add(1, Ordering::SeqCst);
        *self.feed.last.lock() = Some(events.clone());
        *self.feed.events.lock() = Some(events);
        Ok(())
    }

    fn stop(&mut self) {
        self.probe.capture_off();
        *self.feed.events.lock() = None;
    }
}

/// Audio output that "plays" for a fixed duration
pub struct MockSink {
    probe: DeviceProbe,
    play_for: Duration,
    blocked: AtomicBool,
    unlock_calls: AtomicUsize,
    next_handle: AtomicU64,
    pub loaded: AtomicUsize,
    pub released: Mutex<Vec<AssetHandle>>,
}

impl MockSink {
    pub fn new(probe: &DeviceProbe, play_for: Duration) -> Arc<Self> {
        Arc::new(Self {
            probe: probe.clone(),
            play_for,
            blocked: AtomicBool::new(false),
            unlock_calls: AtomicUsize::new(0),
            next_handle: AtomicU64::new(1),
            loaded: AtomicUsize::new(0),
            released: Mutex::new(Vec::new()),
        })
    }

    /// Output that refuses to play until a user gesture; the silent probe
    /// at session start does not count as one
    pub fn autoplay_blocked(probe: &DeviceProbe, play_for: Duration) -> Arc<Self> {
        let sink = Self::new(probe, play_for);
        sink.blocked.store(true, Ordering::SeqCst);
        sink
    }

    pub fn released_count(&self) -> usize {
        self.released.lock().len()
    }

    pub fn loaded_count(&self) -> usize {
        self.loaded.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioSink for MockSink {
    async fn unlock(&self) -> Result<()> {
        let call = self.unlock_calls.fetch_add(1, Ordering::SeqCst);
        if self.blocked.load(Ordering::SeqCst) && call == 0 {
            return Err(VivaError::AutoplayBlocked("no gesture".into()));
        }
        self.blocked.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn load(&self, bytes: Vec<u8>) -> Result<AssetHandle> {
        if bytes.is_empty() {
            return Err(VivaError::PlaybackError("decode failed".into()));
        }
        self.loaded.fetch_add(1, Ordering::SeqCst);
        Ok(self.next_handle.fetch_add(1, Ordering::SeqCst))
    }

    async fn play(&self, _handle: AssetHandle) -> Result<()> {
        if self.blocked.load(Ordering::SeqCst) {
            return Err(VivaError::AutoplayBlocked("gesture required".into()));
        }
        self.probe.playback_on();
        tokio::time::sleep(self.play_for).await;
        self.probe.playback_off();
        Ok(())
    }

    fn stop(&self) {
        self.probe.playback_off();
    }

    fn release(&self, handle: AssetHandle) {
        self.released.lock().push(handle);
    }
}

/// Device speech engine
pub struct MockLocalSpeech {
    probe: DeviceProbe,
    available: bool,
    speak_for: Duration,
    pub spoken: Mutex<Vec<String>>,
}

impl MockLocalSpeech {
    pub fn new(probe: &DeviceProbe, available: bool, speak_for: Duration) -> Arc<Self> {
        Arc::new(Self {
            probe: probe.clone(),
            available,
            speak_for,
            spoken: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl LocalSpeech for MockLocalSpeech {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn speak(&self, text: &str, _language: Language) -> Result<()> {
        self.spoken.lock().push(text.to_string());
        self.probe.playback_on();
        tokio::time::sleep(self.speak_for).await;
        self.probe.playback_off();
        Ok(())
    }

    fn cancel(&self) {
        self.probe.playback_off();
    }
}

/// Remote voice that either returns a few bytes or fails
pub struct MockVoice {
    pub fail: bool,
    pub calls: AtomicUsize,
}

impl MockVoice {
    pub fn working() -> Arc<Self> {
        Arc::new(Self {
            fail: false,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl VoiceSynthesizer for MockVoice {
    async fn synthesize(&self, _text: &str, _voice_id: &str) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(VivaError::SynthesisError("service down".into()))
        } else {
            Ok(vec![0u8; 32])
        }
    }
}

/// Content service with fixed questions; evaluation can be made to fail
pub struct ScriptedContent {
    pub questions: Vec<Question>,
    pub fail_evaluation: bool,
    pub score: u8,
    pub evaluations: AtomicUsize,
}

impl ScriptedContent {
    pub fn new(questions: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            questions: questions
                .iter()
                .map(|q| Question::new(*q, "general"))
                .collect(),
            fail_evaluation: false,
            score: 8,
            evaluations: AtomicUsize::new(0),
        })
    }

    pub fn failing_evaluation(questions: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            questions: questions
                .iter()
                .map(|q| Question::new(*q, "general"))
                .collect(),
            fail_evaluation: true,
            score: 8,
            evaluations: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ContentService for ScriptedContent {
    async fn generate_questions(&self, _: &ContentContext, count: usize) -> Result<Vec<Question>> {
        Ok(self.questions.iter().take(count).cloned().collect())
    }

    async fn evaluate_answer(&self, _: &Question, _: &str, _: &ContentContext) -> Result<Evaluation> {
        self.evaluations.fetch_add(1, Ordering::SeqCst);
        if self.fail_evaluation {
            return Err(VivaError::ContentError("evaluation timed out".into()));
        }
        Ok(Evaluation {
            score: self.score,
            strengths: vec!["structure".into()],
            improvements: vec!["examples".into()],
        })
    }

    async fn generate_transition(
        &self,
        _: &[Turn],
        _: &Question,
        next: &Question,
        _: &ContentContext,
    ) -> Result<String> {
        Ok(format!("Good. Next up: {}", next.question))
    }

    async fn generate_summary(&self, results: &[EvaluationResult], _: &ContentContext) -> Result<Summary> {
        Ok(Summary {
            summary: format!("{} questions answered", results.len()),
            top_strength: "structure".into(),
            top_improvement: "examples".into(),
        })
    }
}

/// Poll `condition` while letting (paused) time advance; `false` on timeout
pub async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..2000 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    condition()
}

/// Candidate may answer: the floor is open and the session interactive
pub fn candidate_turn(handle: &InterviewHandle) -> bool {
    handle.floor() == FloorState::Listening && handle.phase().is_interactive()
}

/// Submit a typed answer and wait until the agent has replied and the
/// floor is open again (or the interview ended)
pub async fn answer(handle: &InterviewHandle, text: &str) -> bool {
    let before = handle.session().transcript().len();
    handle.submit_text(text).unwrap();
    wait_for(|| {
        let grew = handle.session().transcript().len() >= before + 2;
        grew && (candidate_turn(handle) || handle.phase() == Phase::Ended)
    })
    .await
}

pub fn drain(handle: &InterviewHandle) -> Vec<InterviewEvent> {
    let mut events = Vec::new();
    while let Some(event) = handle.try_recv_event() {
        events.push(event);
    }
    events
}
