//! Console driver: wires the store, the LLM client, and the mailer into an
//! orchestrator and runs one conversation on stdin/stdout.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use mediagent::config;
use mediagent::db::{self, seed, Store};
use mediagent::flow::{FlowError, Orchestrator, TurnStatus};
use mediagent::llm::{Assistant, OllamaClient};
use mediagent::notify::{NoopMailer, Notifier, ResendMailer};

const BOLD: &str = "\x1b[1m";
const CYAN: &str = "\x1b[36m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

#[derive(Parser)]
#[command(name = "mediagent", version = config::APP_VERSION)]
#[command(about = "Asistente conversacional para agendar citas médicas")]
struct Args {
    /// Patient starting the conversation
    #[arg(long, default_value = "pac-001")]
    patient: String,

    /// Database path (created and seeded on first run)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Chat model served by Ollama
    #[arg(long, default_value = config::DEFAULT_CHAT_MODEL)]
    chat_model: String,

    /// Parse model served by Ollama
    #[arg(long, default_value = config::DEFAULT_PARSE_MODEL)]
    parse_model: String,
}

fn main() -> ExitCode {
    // .env is optional; environment wins over file values.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let db_path = args.db.unwrap_or_else(config::default_db_path);
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = db::open_database(&db_path)?;
    if seed::is_empty(&conn)? {
        tracing::info!(path = %db_path.display(), "Empty database, seeding demo data");
        seed::seed_demo_data(&conn, chrono::Local::now().date_naive())?;
    }
    let store = Store::new(conn);

    let client = OllamaClient::from_env();
    tracing::info!(ollama = client.base_url(), "LLM client ready");
    let assistant = Assistant::new(Box::new(client), &args.chat_model, &args.parse_model);

    let notifier: Box<dyn Notifier> = match ResendMailer::from_env() {
        Some(mailer) => Box::new(mailer),
        None => {
            tracing::info!(
                "{} not set, confirmation emails disabled",
                config::RESEND_API_KEY_ENV
            );
            Box::new(NoopMailer)
        }
    };

    let mut orchestrator = Orchestrator::new(store, assistant, notifier);

    println!(
        "{BOLD}{CYAN}🏥 {} v{}{RESET}",
        config::APP_NAME,
        config::APP_VERSION
    );
    println!("{DIM}Escribe 'salir' para terminar.{RESET}\n");

    let turn = match orchestrator.start("console", &args.patient) {
        Ok(turn) => turn,
        Err(FlowError::UnknownPatient(id)) => {
            eprintln!("Paciente desconocido: {id}. Pacientes disponibles:");
            for known in orchestrator.store().patient_ids()? {
                eprintln!("  {known}");
            }
            return Err(FlowError::UnknownPatient(id).into());
        }
        Err(e) => return Err(e.into()),
    };
    print_turn(&turn.messages);
    if let TurnStatus::Finished(_) = turn.status {
        return Ok(());
    }

    let stdin = io::stdin();
    prompt()?;
    for line in stdin.lock().lines() {
        let line = line?;
        let text = line.trim();
        if text.is_empty() {
            prompt()?;
            continue;
        }
        if matches!(text.to_lowercase().as_str(), "salir" | "exit" | "quit") {
            println!("{DIM}¡Hasta pronto! 👋{RESET}");
            return Ok(());
        }

        let turn = orchestrator.resume("console", text)?;
        print_turn(&turn.messages);
        if let TurnStatus::Finished(phase) = turn.status {
            tracing::debug!(?phase, "Console session finished");
            return Ok(());
        }
        prompt()?;
    }
    Ok(())
}

fn print_turn(messages: &[String]) {
    for msg in messages {
        println!("{CYAN}{msg}{RESET}\n");
    }
}

fn prompt() -> io::Result<()> {
    print!("{BOLD}> {RESET}");
    io::stdout().flush()
}
