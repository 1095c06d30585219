//! Interviewer event loop
//!
//! Connects the session machine, the content gateway and the turn
//! coordinator: Session -> Content -> Turn (speak) -> Turn (listen) ->
//! Session. All state changes happen on one task running a `select!` loop;
//! content calls and playback run in spawned tasks that report back tagged
//! with a session epoch or speech id, so results from an abandoned session
//! are dropped on arrival.

use crate::capture::{CaptureChannel, CaptureEvent, SpeechRecognizer};
use crate::content::{
    ContentContext, ContentGateway, ContentService, CreditBudget, CreditGate, HttpContentService,
};
use crate::integration::config::InterviewConfig;
use crate::integration::notice::{Notice, NoticeBoard};
use crate::playback::{
    AudioSink, HttpVoiceSynthesizer, LocalSpeech, PlaybackChannel, PlaybackProgress,
    VoiceSynthesizer,
};
use crate::session::{
    CandidateProfile, EvaluationResult, Phase, Question, ReviewOutcome, ReviewRequest,
    SessionMachine, SharedSession, Step, Summary,
};
use crate::turn::{
    CaptureSignal, FloorEvents, FloorState, ListenOutcome, SharedFloor, SpeechEvent,
    TurnCoordinator,
};
use crate::{Result, VivaError};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Commands that can be sent to the interviewer
#[derive(Debug, Clone)]
pub enum InterviewCommand {
    /// Start a new interview (from setup or after the previous one ended)
    Start(CandidateProfile),

    /// Typed answer
    SubmitText(String),

    /// User gesture to enable blocked audio
    RetryAudio,

    /// Mute or unmute the agent's voice
    SetMuted(bool),

    /// End the interview now and produce the summary
    EndInterview,

    /// Back to setup, discarding the session
    Reset,

    /// Shutdown the interviewer
    Shutdown,
}

/// Events emitted by the interviewer
#[derive(Debug, Clone)]
pub enum InterviewEvent {
    PhaseChanged(Phase),

    FloorChanged(FloorState),

    /// Line the agent is about to speak
    AgentLine(String),

    /// Accepted candidate utterance
    CandidateLine(String),

    /// Live transcript while the candidate speaks
    InterimTranscript(String),

    Notice(Notice),

    EvaluationRecorded(EvaluationResult),

    /// `None` when no summary could be produced
    SummaryReady(Option<Summary>),

    /// Interviewer has shut down
    Shutdown,
}

/// Completed background content work
enum TaskResult {
    Questions { epoch: u64, questions: Vec<Question> },
    Review { epoch: u64, outcome: ReviewOutcome },
    Summary { epoch: u64, summary: Option<Summary> },
}

/// Handle for controlling the interviewer from a UI
#[derive(Clone)]
pub struct InterviewHandle {
    command_tx: UnboundedSender<InterviewCommand>,
    event_rx: Receiver<InterviewEvent>,
    floor: SharedFloor,
    session: SharedSession,
    default_profile: CandidateProfile,
}

impl InterviewHandle {
    /// Send a command to the interviewer
    pub fn send_command(&self, cmd: InterviewCommand) -> Result<()> {
        self.command_tx
            .send(cmd)
            .map_err(|e| VivaError::ChannelError(format!("Failed to send command: {}", e)))
    }

    pub fn start(&self, profile: CandidateProfile) -> Result<()> {
        self.send_command(InterviewCommand::Start(profile))
    }

    /// Start with the configured candidate profile
    pub fn start_default(&self) -> Result<()> {
        self.start(self.default_profile.clone())
    }

    pub fn submit_text(&self, text: impl Into<String>) -> Result<()> {
        self.send_command(InterviewCommand::SubmitText(text.into()))
    }

    pub fn retry_audio(&self) -> Result<()> {
        self.send_command(InterviewCommand::RetryAudio)
    }

    pub fn set_muted(&self, muted: bool) -> Result<()> {
        self.send_command(InterviewCommand::SetMuted(muted))
    }

    pub fn end_interview(&self) -> Result<()> {
        self.send_command(InterviewCommand::EndInterview)
    }

    pub fn reset(&self) -> Result<()> {
        self.send_command(InterviewCommand::Reset)
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send_command(InterviewCommand::Shutdown)
    }

    /// Try to receive an event from the interviewer
    pub fn try_recv_event(&self) -> Option<InterviewEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Block until an event arrives; `None` once the interviewer is gone
    pub fn recv_event(&self) -> Option<InterviewEvent> {
        self.event_rx.recv().ok()
    }

    /// Block for at most `timeout`
    pub fn recv_event_timeout(&self, timeout: Duration) -> Option<InterviewEvent> {
        match self.event_rx.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn floor(&self) -> FloorState {
        self.floor.get()
    }

    pub fn is_agent_speaking(&self) -> bool {
        self.floor.is_agent_speaking()
    }

    pub fn phase(&self) -> Phase {
        self.session.phase()
    }

    pub fn session(&self) -> &SharedSession {
        &self.session
    }
}

async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

pub struct Interviewer {
    config: InterviewConfig,
    machine: SessionMachine,
    coordinator: TurnCoordinator,
    floor_events: FloorEvents,
    content: Arc<ContentGateway>,
    notices: NoticeBoard,
    command_rx: UnboundedReceiver<InterviewCommand>,
    event_tx: Sender<InterviewEvent>,
    task_tx: UnboundedSender<TaskResult>,
    task_rx: UnboundedReceiver<TaskResult>,
    /// Bumped whenever a session is started, ended early or reset
    epoch: u64,
    /// A content call is in flight; candidate input is dropped
    busy: bool,
    muted: bool,
    last_phase: Phase,
    last_floor: FloorState,
}

impl Interviewer {
    /// Run the event loop on a new task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        info!("Interviewer running");
        loop {
            let silence = self.coordinator.silence_deadline();
            let resume = self.coordinator.resume_deadline();
            let restart = self.coordinator.restart_deadline();

            tokio::select! {
                cmd = self.command_rx.recv() => match cmd {
                    Some(InterviewCommand::Shutdown) | None => break,
                    Some(cmd) => self.handle_command(cmd),
                },
                Some(event) = self.floor_events.capture.recv() => self.handle_capture(event),
                Some(event) = self.floor_events.speech.recv() => self.handle_speech(event),
                Some(result) = self.task_rx.recv() => self.handle_task(result),
                _ = until(silence) => self.handle_silence(),
                _ = until(resume) => self.handle_resume(),
                _ = until(restart) => {
                    let outcome = self.coordinator.restart_capture(Instant::now());
                    self.handle_listen_outcome(outcome);
                }
            }

            self.publish_changes();
        }

        self.coordinator.abort_all();
        self.publish_changes();
        self.emit(InterviewEvent::Shutdown);
        info!("Interviewer stopped");
    }

    fn emit(&self, event: InterviewEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => warn!("Event channel full, dropping {:?}", event),
            Err(TrySendError::Disconnected(_)) => debug!("No event listener"),
        }
    }

    fn post_notice(&mut self, notice: Notice) {
        if self.notices.post(notice) {
            info!("Notice: {}", notice);
            self.emit(InterviewEvent::Notice(notice));
        }
    }

    fn publish_changes(&mut self) {
        let phase = self.machine.phase();
        if phase != self.last_phase {
            self.last_phase = phase;
            self.emit(InterviewEvent::PhaseChanged(phase));
        }
        let floor = self.coordinator.state();
        if floor != self.last_floor {
            self.last_floor = floor;
            self.emit(InterviewEvent::FloorChanged(floor));
        }
    }

    /// The candidate may answer now
    fn accepting_input(&self) -> bool {
        !self.busy && self.machine.phase().is_interactive() && !self.machine.is_reviewing()
    }

    fn handle_command(&mut self, cmd: InterviewCommand) {
        match cmd {
            InterviewCommand::Start(profile) => self.start(profile),
            InterviewCommand::SubmitText(text) => {
                if !self.accepting_input() {
                    debug!("Typed input dropped in phase {}", self.machine.phase());
                    return;
                }
                let text = text.trim().to_string();
                if self.coordinator.screen_typed(&text, Instant::now()) {
                    self.candidate_input(text);
                }
            }
            InterviewCommand::RetryAudio => {
                if !self.coordinator.retry_unlock() {
                    debug!("Retry audio with nothing blocked");
                }
            }
            InterviewCommand::SetMuted(muted) => self.set_muted(muted),
            InterviewCommand::EndInterview => {
                if self.machine.conclude_early() {
                    self.epoch += 1;
                    self.busy = false;
                    self.coordinator.abort_all();
                    self.request_summary();
                }
            }
            InterviewCommand::Reset => {
                self.epoch += 1;
                self.busy = false;
                self.coordinator.reset_session();
                self.notices.reset();
                self.machine.reset();
                info!("Interview reset");
            }
            InterviewCommand::Shutdown => {}
        }
    }

    fn start(&mut self, profile: CandidateProfile) {
        if !self.machine.phase().can_start() {
            debug!("Start ignored in phase {}", self.machine.phase());
            return;
        }
        self.epoch += 1;
        self.busy = false;
        self.coordinator.reset_session();
        self.notices.reset();

        let count = profile.question_count;
        let Some(context) = self.machine.start(profile) else {
            return;
        };
        self.busy = true;

        let epoch = self.epoch;
        let content = self.content.clone();
        let playback = self.coordinator.playback().clone();
        let tx = self.task_tx.clone();
        tokio::spawn(async move {
            playback.prime().await;
            let questions = content.generate_questions(&context, count).await;
            let _ = tx.send(TaskResult::Questions { epoch, questions });
        });
    }

    fn set_muted(&mut self, muted: bool) {
        if self.muted == muted {
            return;
        }
        self.muted = muted;
        info!("Output {}", if muted { "muted" } else { "unmuted" });
        if muted {
            if self.coordinator.state().is_listening() {
                self.coordinator.release_floor();
            }
        } else if self.accepting_input() && self.coordinator.state().is_idle() {
            let outcome = self.coordinator.request_listen(Instant::now());
            self.handle_listen_outcome(outcome);
        }
    }

    fn speak(&mut self, line: String) {
        self.emit(InterviewEvent::AgentLine(line.clone()));
        let voice = self.config.voice_for(self.machine.session().profile().language);
        self.coordinator.request_speak(line, voice, self.muted);
    }

    fn candidate_input(&mut self, text: String) {
        self.coordinator.release_floor();
        self.emit(InterviewEvent::CandidateLine(text.clone()));

        match self.machine.candidate_spoke(&text) {
            Step::Speak(line) => self.speak(line),
            Step::Review(request) => self.request_review(request),
            Step::Conclude { farewell } => {
                self.speak(farewell);
                self.request_summary();
            }
            Step::Ignored => {
                let outcome = self.coordinator.request_listen(Instant::now());
                self.handle_listen_outcome(outcome);
            }
        }
    }

    fn request_review(&mut self, request: ReviewRequest) {
        self.busy = true;
        let epoch = self.epoch;
        let content = self.content.clone();
        let tx = self.task_tx.clone();
        tokio::spawn(async move {
            let ReviewRequest {
                question,
                answer,
                next,
                position,
                conversation,
                context,
            } = request;

            // Evaluation is issued first; the transition call may overlap it
            let evaluation = content.evaluate_answer(&question, &answer, &context);
            let (evaluation, transition) = match &next {
                Some(next) => {
                    let transition = content.generate_transition(
                        &conversation,
                        &question,
                        next,
                        position + 1,
                        &context,
                    );
                    let (evaluation, transition) = tokio::join!(evaluation, transition);
                    (evaluation, Some(transition))
                }
                None => (evaluation.await, None),
            };

            let outcome = ReviewOutcome {
                question,
                answer,
                evaluation,
                transition,
            };
            let _ = tx.send(TaskResult::Review { epoch, outcome });
        });
    }

    fn request_summary(&mut self) {
        self.busy = true;
        let epoch = self.epoch;
        let content = self.content.clone();
        let tx = self.task_tx.clone();
        let (results, context) = {
            let session = self.machine.session().read();
            (session.results.clone(), ContentContext::from(&session.profile))
        };
        tokio::spawn(async move {
            let summary = content.generate_summary(&results, &context).await;
            let _ = tx.send(TaskResult::Summary { epoch, summary });
        });
    }

    fn handle_task(&mut self, result: TaskResult) {
        match result {
            TaskResult::Questions { epoch, questions } if epoch == self.epoch => {
                self.busy = false;
                if let Some(greeting) = self.machine.questions_ready(questions) {
                    self.speak(greeting);
                }
            }
            TaskResult::Review { epoch, outcome } if epoch == self.epoch => {
                self.busy = false;
                if let Some(line) = self.machine.review_ready(outcome) {
                    let recorded = self.machine.session().read().results.last().cloned();
                    if let Some(result) = recorded {
                        self.emit(InterviewEvent::EvaluationRecorded(result));
                    }
                    self.speak(line);
                }
            }
            TaskResult::Summary { epoch, summary } if epoch == self.epoch => {
                self.busy = false;
                self.machine.record_summary(summary.clone());
                self.emit(InterviewEvent::SummaryReady(summary));
            }
            _ => debug!("Result from an abandoned session dropped"),
        }
    }

    fn handle_speech(&mut self, event: SpeechEvent) {
        match event {
            SpeechEvent::Progress { id, progress } => {
                if !self.coordinator.on_speech_progress(id, &progress) {
                    return;
                }
                match progress {
                    PlaybackProgress::RemoteUnavailable(_) => {
                        if self.coordinator.playback().has_local_voice() {
                            self.post_notice(Notice::DeviceVoiceFallback);
                        }
                    }
                    PlaybackProgress::AwaitingUnlock => self.post_notice(Notice::AudioBlocked),
                    PlaybackProgress::Silent => self.post_notice(Notice::AudioUnavailable),
                    PlaybackProgress::Unlocked => {}
                }
            }
            SpeechEvent::Finished { id, tier } => {
                let listen_after = self.machine.phase().is_interactive() && !self.muted;
                if self.coordinator.finish_speaking(id, listen_after, Instant::now()) {
                    debug!("Speech {} finished via {:?}", id, tier);
                }
            }
        }
    }

    fn handle_capture(&mut self, event: CaptureEvent) {
        match self.coordinator.on_capture_event(event, Instant::now()) {
            CaptureSignal::Interim(text) => self.emit(InterviewEvent::InterimTranscript(text)),
            CaptureSignal::MicrophoneUnavailable => self.post_notice(Notice::MicrophoneUnavailable),
            CaptureSignal::Ignored => {}
        }
    }

    fn handle_silence(&mut self) {
        let Some(text) = self.coordinator.on_silence(Instant::now()) else {
            return;
        };
        if self.accepting_input() {
            self.candidate_input(text);
        } else {
            debug!("Utterance dropped while busy: {:?}", text);
        }
    }

    fn handle_resume(&mut self) {
        if self.accepting_input() && !self.muted {
            let outcome = self.coordinator.request_listen(Instant::now());
            self.handle_listen_outcome(outcome);
        } else {
            self.coordinator.cancel_resume();
        }
    }

    fn handle_listen_outcome(&mut self, outcome: ListenOutcome) {
        if outcome == ListenOutcome::MicrophoneUnavailable {
            self.post_notice(Notice::MicrophoneUnavailable);
        }
    }
}

/// Builder for creating an interviewer
pub struct InterviewerBuilder {
    config: InterviewConfig,
    recognizer: Option<Box<dyn SpeechRecognizer>>,
    local_speech: Option<Arc<dyn LocalSpeech>>,
    remote_voice: Option<Arc<dyn VoiceSynthesizer>>,
    sink: Option<Arc<dyn AudioSink>>,
    content: Option<Arc<dyn ContentService>>,
    credits: Option<Arc<dyn CreditGate>>,
}

impl InterviewerBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: InterviewConfig::default(),
            recognizer: None,
            local_speech: None,
            remote_voice: None,
            sink: None,
            content: None,
            credits: None,
        }
    }

    /// Set the complete configuration
    pub fn with_config(mut self, config: InterviewConfig) -> Self {
        self.config = config;
        self
    }

    /// Speech-to-text engine; without one the interview is typed
    pub fn with_recognizer(mut self, recognizer: Box<dyn SpeechRecognizer>) -> Self {
        self.recognizer = Some(recognizer);
        self
    }

    pub fn with_local_speech(mut self, local: Arc<dyn LocalSpeech>) -> Self {
        self.local_speech = Some(local);
        self
    }

    /// Remote voice, overriding `voice.base_url`
    pub fn with_remote_voice(mut self, voice: Arc<dyn VoiceSynthesizer>) -> Self {
        self.remote_voice = Some(voice);
        self
    }

    pub fn with_audio_sink(mut self, sink: Arc<dyn AudioSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Content service, overriding `content.base_url`
    pub fn with_content_service(mut self, service: Arc<dyn ContentService>) -> Self {
        self.content = Some(service);
        self
    }

    /// Credit gate, overriding `content.credits`
    pub fn with_credits(mut self, credits: Arc<dyn CreditGate>) -> Self {
        self.credits = Some(credits);
        self
    }

    pub fn with_phrase_seed(mut self, seed: u64) -> Self {
        self.config.content.phrase_seed = Some(seed);
        self
    }

    fn content_gateway(&mut self) -> Result<ContentGateway> {
        let gateway = match self.content.take() {
            Some(service) => ContentGateway::new(service),
            None => match self.config.content.base_url.clone() {
                Some(url) => ContentGateway::new(Arc::new(HttpContentService::new(
                    url,
                    self.config.content.api_key.clone(),
                    Duration::from_secs(self.config.content.timeout_secs),
                )?)),
                None => {
                    info!("No content service configured, using built-in content");
                    ContentGateway::offline()
                }
            },
        };
        Ok(self.finish_gateway(gateway))
    }

    fn finish_gateway(&mut self, mut gateway: ContentGateway) -> ContentGateway {
        let credits = self.credits.take().or_else(|| {
            self.config
                .content
                .credits
                .map(|n| Arc::new(CreditBudget::new(n)) as Arc<dyn CreditGate>)
        });
        if let Some(credits) = credits {
            gateway = gateway.with_credits(credits);
        }
        if let Some(seed) = self.config.content.phrase_seed {
            gateway = gateway.with_phrase_seed(seed);
        }
        gateway
    }

    fn remote_voice(&mut self) -> Result<Option<Arc<dyn VoiceSynthesizer>>> {
        if let Some(voice) = self.remote_voice.take() {
            return Ok(Some(voice));
        }
        let voice = &self.config.voice;
        match &voice.base_url {
            Some(url) => Ok(Some(Arc::new(HttpVoiceSynthesizer::new(
                url.clone(),
                voice.api_key.clone(),
                voice.model.clone(),
                Duration::from_secs(voice.timeout_secs),
            )?))),
            None => Ok(None),
        }
    }

    /// Build the interviewer
    pub fn build(mut self) -> Result<(Interviewer, InterviewHandle)> {
        self.config.validate()?;

        let content = Arc::new(self.content_gateway()?);
        let remote = self.remote_voice()?;
        let playback = Arc::new(PlaybackChannel::new(
            remote,
            self.local_speech.take(),
            self.sink.take(),
            self.config.timing.unlock_timeout(),
        ));

        let floor = SharedFloor::new();
        let session = SharedSession::new();
        let (coordinator, floor_events) = TurnCoordinator::new(
            CaptureChannel::new(self.recognizer.take()),
            playback,
            floor.clone(),
            self.config.timing.clone(),
        );

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = bounded(self.config.event_buffer_size);
        let (task_tx, task_rx) = mpsc::unbounded_channel();

        let handle = InterviewHandle {
            command_tx,
            event_rx,
            floor,
            session: session.clone(),
            default_profile: self.config.candidate.clone(),
        };

        let interviewer = Interviewer {
            muted: self.config.voice.muted,
            config: self.config,
            machine: SessionMachine::new(session),
            coordinator,
            floor_events,
            content,
            notices: NoticeBoard::new(),
            command_rx,
            event_tx,
            task_tx,
            task_rx,
            epoch: 0,
            busy: false,
            last_phase: Phase::Setup,
            last_floor: FloorState::Idle,
        };

        Ok((interviewer, handle))
    }
}

impl Default for InterviewerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
