use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use interview_session::{
    create_router, ApiClient, AppState, Config, DeviceScript, RecognizerProbe, ScriptedDevices,
    SessionController, SessionError, SessionState,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// AI interview session controller
#[derive(Parser)]
#[command(name = "interview-session")]
#[command(about = "Run an AI interview session against the interview backend", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (without extension)
    #[arg(short, long, default_value = "config/interview-session")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Take an interview end to end with scripted devices
    Run(RunArgs),
    /// Serve the local control API for one interview
    Serve(ServeArgs),
}

#[derive(Parser)]
struct RunArgs {
    /// Interview URL slug
    #[arg(short, long)]
    slug: String,

    /// Device script (JSON); defaults to granted devices and no spoken answers
    #[arg(long)]
    script: Option<PathBuf>,

    /// How many times a failed submission is retried
    #[arg(long, default_value = "2")]
    retries: u32,
}

#[derive(Parser)]
struct ServeArgs {
    /// Interview URL slug
    #[arg(short, long)]
    slug: String,

    /// Device script (JSON)
    #[arg(long)]
    script: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("Interview Session v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);
    info!("Interview backend: {}", cfg.api.base_url);

    match cli.command {
        Commands::Run(args) => run(cfg, args).await,
        Commands::Serve(args) => serve(cfg, args).await,
    }
}

fn load_script(path: Option<&PathBuf>) -> Result<DeviceScript> {
    match path {
        Some(path) => DeviceScript::load(path),
        None => Ok(DeviceScript {
            speech_ms: 500,
            utterance_gap_ms: 300,
            ..Default::default()
        }),
    }
}

async fn run(cfg: Config, args: RunArgs) -> Result<()> {
    let script = load_script(args.script.as_ref())?;
    let answers = script.answers.clone();
    let speech_driven = script.speech_ms > 0;
    let utterance_gap = Duration::from_millis(script.utterance_gap_ms);

    let scripted = ScriptedDevices::new(script);
    let recognizer = scripted.recognizer.clone();
    let synthesizer = scripted.synthesizer.clone();

    let backend = Arc::new(ApiClient::new(&cfg.api.base_url, cfg.api_timeout())?);
    let mut session = SessionController::new(cfg.session_config(), backend, scripted.devices);

    session.fetch_context(&args.slug).await?;
    session.start().await?;

    let total = session.context().map_or(0, |c| c.total_questions());

    for index in 0..total {
        if let Some(question) = session.current_question() {
            info!("Asking {}: {}", question.label(), question.question.text);
        }

        if !speech_driven {
            synthesizer.finish();
        }
        session.wait_until_spoken().await;

        let utterances = answers.get(index).cloned().unwrap_or_default();
        answer(&mut session, &recognizer, utterances, utterance_gap).await;

        info!(
            "Answer {}/{}: {:?}",
            index + 1,
            total,
            session.transcript().finalized()
        );

        match session.advance_question().await {
            Ok(_) => {}
            Err(SessionError::Submission(e)) => {
                warn!("Submission failed: {}", e);
                retry(&mut session, args.retries).await?;
            }
            Err(e) => return Err(e).context("Failed to advance the interview"),
        }
    }

    if *session.state() != SessionState::Finished {
        bail!("Interview ended in state {}", session.state().name());
    }

    let summary = serde_json::to_string_pretty(session.answers())?;
    info!("Interview completed with {} answers", session.answers().len());
    println!("{}", summary);

    Ok(())
}

/// Let the scripted candidate speak the utterances for one question
async fn answer(
    session: &mut SessionController,
    recognizer: &RecognizerProbe,
    utterances: Vec<String>,
    utterance_gap: Duration,
) {
    if utterance_gap.is_zero() {
        for utterance in &utterances {
            recognizer.emit_final(utterance);
        }
        session.pump();
        return;
    }

    let count = utterances.len() as u32;
    recognizer.feed(utterances);
    session.run_for(utterance_gap * (count + 1)).await;
}

async fn retry(session: &mut SessionController, retries: u32) -> Result<()> {
    for attempt in 1..=retries {
        tokio::time::sleep(Duration::from_secs(2)).await;
        info!("Retrying submission ({}/{})", attempt, retries);
        match session.retry_submission().await {
            Ok(()) => return Ok(()),
            Err(e) => warn!("Retry {} failed: {}", attempt, e),
        }
    }
    bail!("Submission failed after {} retries", retries)
}

async fn serve(cfg: Config, args: ServeArgs) -> Result<()> {
    let script = load_script(args.script.as_ref())?;
    let answers = script.answers.clone();

    let scripted = ScriptedDevices::new(script);
    let recognizer = scripted.recognizer.clone();

    let backend = Arc::new(ApiClient::new(&cfg.api.base_url, cfg.api_timeout())?);
    let controller = SessionController::new(cfg.session_config(), backend, scripted.devices);

    let (state, pump) = AppState::new(controller, args.slug);
    let candidate = tokio::spawn(scripted_candidate(state.clone(), recognizer, answers));
    let app = create_router(state);

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind control API to {}", addr))?;

    info!("Control API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutting down");
        })
        .await
        .context("Control API server error")?;

    candidate.abort();
    pump.abort();
    Ok(())
}

/// Feed the scripted answers for each question once it has been read out
async fn scripted_candidate(state: AppState, recognizer: RecognizerProbe, answers: Vec<Vec<String>>) {
    let mut answered = None;
    let mut ticker = tokio::time::interval(Duration::from_millis(250));

    loop {
        ticker.tick().await;

        let cursor = {
            let session = state.session.lock().await;
            if session.is_speaking() {
                continue;
            }
            session.state().cursor()
        };

        if let Some(cursor) = cursor {
            if answered != Some(cursor) {
                answered = Some(cursor);
                if let Some(utterances) = answers.get(cursor) {
                    recognizer.feed(utterances.iter().cloned());
                }
            }
        }
    }
}
