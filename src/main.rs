use anyhow::{Context, Result};
use std::io::BufRead;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use viva::integration::{InterviewConfig, InterviewEvent, InterviewHandle, InterviewerBuilder};
use viva::session::Phase;

/// Forward terminal lines to the interviewer until `/quit` or EOF
fn read_answers(handle: InterviewHandle) {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        let sent = match line.trim() {
            "/quit" => break,
            "/end" => handle.end_interview(),
            "/new" => handle.start_default(),
            "" => continue,
            text => handle.submit_text(text),
        };
        if sent.is_err() {
            break;
        }
    }
    let _ = handle.shutdown();
}

fn print_events(handle: InterviewHandle) {
    while let Some(event) = handle.recv_event() {
        match event {
            InterviewEvent::AgentLine(line) => println!("\nInterviewer: {}", line),
            InterviewEvent::CandidateLine(line) => println!("You: {}", line),
            InterviewEvent::Notice(notice) => println!("[{}]", notice),
            InterviewEvent::EvaluationRecorded(result) => {
                println!("  (score {}/10)", result.score)
            }
            InterviewEvent::SummaryReady(Some(summary)) => {
                println!("\n== Summary ==\n{}", summary.summary);
                println!("Top strength: {}", summary.top_strength);
                println!("To improve: {}", summary.top_improvement);
            }
            InterviewEvent::SummaryReady(None) => println!("\nInterview complete."),
            InterviewEvent::PhaseChanged(Phase::Ended) => {
                if let Some(average) = handle.session().read().average_score() {
                    println!("Average score: {:.1}/10", average);
                }
                println!("-- /new to start again, /quit to exit --");
            }
            InterviewEvent::Shutdown => break,
            _ => {}
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "viva=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => InterviewConfig::load(&path)
            .with_context(|| format!("Failed to load configuration from {}", path))?,
        None => InterviewConfig::default(),
    }
    .apply_env();

    info!("Starting Viva mock interview");

    let (interviewer, handle) = InterviewerBuilder::new().with_config(config).build()?;
    let task = interviewer.spawn();

    let input = handle.clone();
    std::thread::spawn(move || read_answers(input));

    let events = handle.clone();
    let printer = tokio::task::spawn_blocking(move || print_events(events));

    println!("Type your answers and press Enter. /end finishes early, /quit exits.");
    handle.start_default()?;

    task.await?;
    printer.await?;
    Ok(())
}
