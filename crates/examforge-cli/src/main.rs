//! examforge CLI — the user-facing command-line interface.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use uuid::Uuid;

mod commands;
mod state;

#[derive(Parser)]
#[command(name = "examforge", version, about = "Adaptive practice-exam assembly and scoring")]
struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// State directory (profiles and sessions)
    #[arg(long, global = true)]
    state: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate question bank files
    Validate {
        /// Path to a .json bank file or directory
        #[arg(long)]
        bank: PathBuf,
    },

    /// Load a question bank into the index and show its distribution
    Ingest {
        /// Path to a .json bank file or directory
        #[arg(long)]
        bank: PathBuf,

        /// Exam type for records that carry none
        #[arg(long)]
        exam: Option<String>,
    },

    /// Assemble a personalized test for a learner
    Generate {
        /// Path to a .json bank file or directory
        #[arg(long)]
        bank: PathBuf,

        /// Learner id
        #[arg(long)]
        user: String,

        /// Questions in the test (capped at 90)
        #[arg(long, default_value = "30")]
        questions: usize,

        /// Comma-separated subjects
        #[arg(long, default_value = "Physics,Chemistry,Mathematics")]
        subjects: String,

        /// Exam type for records that carry none
        #[arg(long)]
        exam: Option<String>,

        /// Fixed shuffle seed (deterministic assembly)
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Score submitted answers for a generated test
    Evaluate {
        /// Path to a .json bank file or directory
        #[arg(long)]
        bank: PathBuf,

        /// Learner id
        #[arg(long)]
        user: String,

        /// Test session id
        #[arg(long)]
        test: Uuid,

        /// JSON answers file: {"0": "A", "1": "B,C", ...}
        #[arg(long)]
        answers: PathBuf,

        /// Write a markdown report to this path
        #[arg(long)]
        report: Option<PathBuf>,

        /// Call the analysis collaborator (falls back on failure)
        #[arg(long)]
        analyze: bool,

        /// Exam type for records that carry none
        #[arg(long)]
        exam: Option<String>,
    },

    /// Show a learner's performance profile
    Profile {
        /// Learner id
        #[arg(long)]
        user: String,

        /// Restrict the weak-topic listing to one subject
        #[arg(long)]
        subject: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("examforge=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    let ctx = match state::CliContext::new(cli.config.as_deref(), cli.state) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Error: {e:#}");
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Validate { bank } => commands::validate::execute(bank),
        Commands::Ingest { bank, exam } => commands::ingest::execute(&ctx, bank, exam).await,
        Commands::Generate {
            bank,
            user,
            questions,
            subjects,
            exam,
            seed,
        } => commands::generate::execute(&ctx, bank, user, questions, subjects, exam, seed).await,
        Commands::Evaluate {
            bank,
            user,
            test,
            answers,
            report,
            analyze,
            exam,
        } => {
            commands::evaluate::execute(&ctx, bank, user, test, answers, report, analyze, exam)
                .await
        }
        Commands::Profile { user, subject } => commands::profile::execute(&ctx, user, subject).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
