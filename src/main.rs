use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use lectern::api::ApiClient;
use lectern::config;
use lectern::model::{LectureDraft, MediaFile};
use lectern::store::LectureStore;
use lectern::upload::upload_lecture;
use lectern::validate::validate;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file (defaults to lectern.yaml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Upload a lecture video for processing and store the study pack
    Upload {
        #[arg(long)]
        title: String,
        #[arg(long)]
        video: PathBuf,
        /// Optional PDF slides for visual context
        #[arg(long)]
        slides: Option<PathBuf>,
    },
    /// List every lecture in the library, newest first
    List,
    /// Print one lecture as JSON
    Show { id: String },
    /// Search lecture titles
    Search { term: String },
    /// Remove a lecture from the library
    Delete { id: String },
    /// Export the whole library as a JSON array
    Export {
        /// Write to a file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Import lectures from a JSON export
    Import { path: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(args.config.as_deref())?;
    cfg.ensure_dirs()?;

    let base_url =
        std::env::var("LECTERN_API_URL").unwrap_or_else(|_| cfg.api.base_url.clone());
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| format!("sqlite://{}/lectern.db", cfg.app.data_dir));
    let store = LectureStore::new(database_url);

    match args.command {
        Command::Upload {
            title,
            video,
            slides,
        } => {
            let video = MediaFile::from_path(video).await?;
            let slides = match slides {
                Some(path) => Some(MediaFile::from_path(path).await?),
                None => None,
            };

            let errors = validate(&title, Some(&video), slides.as_ref());
            if let Some(first) = errors.first() {
                bail!("{first}");
            }

            let client = ApiClient::from_base_url(&base_url)?;
            let draft = LectureDraft {
                title,
                video,
                slides,
            };
            let lecture = upload_lecture(&client, &store, &cfg.upload, draft, |stage, pct| {
                match pct {
                    Some(pct) => info!(%stage, pct = format!("{:.0}%", pct * 100.0), "progress"),
                    None => info!(%stage, "progress"),
                }
            })
            .await?;
            println!("{}  [{}]  {}", lecture.id, lecture.status, lecture.title);
        }
        Command::List => {
            for lecture in store.get_all_lectures().await? {
                println!(
                    "{}  [{}]  {}  {}",
                    lecture.id,
                    lecture.status,
                    lecture.created_at.format("%Y-%m-%d %H:%M"),
                    lecture.title
                );
            }
        }
        Command::Show { id } => match store.get_lecture(&id).await? {
            Some(lecture) => println!("{}", serde_json::to_string_pretty(&lecture)?),
            None => bail!("no lecture with id {id}"),
        },
        Command::Search { term } => {
            for lecture in store.search_lectures(&term).await? {
                println!("{}  [{}]  {}", lecture.id, lecture.status, lecture.title);
            }
        }
        Command::Delete { id } => {
            store.delete_lecture(&id).await?;
            println!("deleted {id}");
        }
        Command::Export { output } => {
            let json = store.export_to_json().await?;
            match output {
                Some(path) => {
                    tokio::fs::write(&path, &json).await?;
                    println!("exported to {}", path.display());
                }
                None => println!("{json}"),
            }
        }
        Command::Import { path } => {
            let json = tokio::fs::read_to_string(&path).await?;
            let count = store.import_from_json(&json).await?;
            println!("imported {count} lectures");
        }
    }

    Ok(())
}
