use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shared::domain::{DocumentId, SessionId};
use storage::{log_type_label, DocumentStore, Storage};
use uuid::Uuid;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/survey.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Most recently active sessions.
    Sessions {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Every record written for one session.
    Session { session_id: String },
    /// Print one stored document as JSON.
    Show { document_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url).await?;
    storage.health_check().await?;

    match cli.command {
        Command::Sessions { limit } => {
            for (session_id, records) in storage.list_sessions(limit).await? {
                println!("{session_id}  records={records}");
            }
        }
        Command::Session { session_id } => {
            let session_id = SessionId(
                Uuid::parse_str(&session_id)
                    .with_context(|| format!("'{session_id}' is not a session id"))?,
            );
            for (log_type, count) in storage.count_by_log_type(session_id).await? {
                println!("{log_type}: {count}");
            }
            for log in storage.list_for_session(session_id).await? {
                let record = &log.record;
                println!(
                    "{}  step={:>2}  {:<14}  aids={}",
                    log.id,
                    record.current_step,
                    log_type_label(record.log_type),
                    record.answers.answered_mobility_aids.join(",")
                );
            }
        }
        Command::Show { document_id } => {
            let id = DocumentId(document_id);
            match storage.fetch(&id).await? {
                Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
                None => println!("no document with id {id}"),
            }
        }
    }

    Ok(())
}
