//! Wiring: configuration, notices and the interviewer event loop

pub mod config;
pub mod notice;
pub mod orchestrator;

pub use config::{ContentConfig, InterviewConfig, TimingConfig, VoiceConfig};
pub use notice::{Notice, NoticeBoard};
pub use orchestrator::{
    InterviewCommand, InterviewEvent, InterviewHandle, Interviewer, InterviewerBuilder,
};
