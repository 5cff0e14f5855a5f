//! `coursepath`: follow a course from the terminal.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use course_core::model::{CourseId, ExamKind, LessonId, UserId};
use course_core::navigator::{AdvanceOutcome, ExamStatus, Position, ProgressSummary};
use services::{ApiConfig, AppServices, Clock, SessionError, SessionLifetime};

#[derive(Parser, Debug)]
#[command(name = "coursepath")]
#[command(about = "Track course progress and exam gates", long_about = None)]
struct Cli {
    /// SQLite database for cached outlines, progress and login
    #[arg(long = "db", env = "COURSE_DB_URL", default_value = "sqlite://coursepath.sqlite3")]
    db_url: String,

    /// Course service base URL
    #[arg(long = "api-url", env = "COURSE_API_BASE_URL")]
    api_url: Option<String>,

    /// Learner id; defaults to the stored login
    #[arg(long = "user", env = "COURSE_USER_ID")]
    user: Option<String>,

    /// Bearer token; overrides the stored login
    #[arg(long = "token", env = "COURSE_API_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Commands {
    /// Log in and remember the token
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "COURSE_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the stored login
    Logout,
    /// Show progress, next lesson and exam gates
    Status {
        course: String,
        /// Use cached data only
        #[arg(long)]
        offline: bool,
    },
    /// Mark a lesson complete
    Complete { course: String, lesson: String },
    /// Re-send completions that failed earlier
    Retry { course: String },
    /// Try to move past a lesson (1-based chapter and lesson numbers)
    Next {
        course: String,
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        chapter: u32,
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        lesson: u32,
    },
    /// Request the course certificate
    Certificate { course: String },
}

fn normalize_sqlite_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed == "sqlite::memory:" || trimmed.starts_with("sqlite://") {
        return trimmed.to_string();
    }

    let path_str = trimmed.strip_prefix("sqlite:").unwrap_or(trimmed);
    let path = Path::new(path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

/// Make sure the directory holding the database file exists.
fn prepare_sqlite_dir(db_url: &str) -> Result<()> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }
    let Some(path) = db_url.strip_prefix("sqlite://") else {
        return Ok(());
    };
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        bail!("invalid --db value: {db_url}");
    }
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }
    Ok(())
}

fn parse_position(chapter: u32, lesson: u32) -> Result<Position> {
    let chapter = usize::try_from(chapter.saturating_sub(1))?;
    let lesson = usize::try_from(lesson.saturating_sub(1))?;
    Ok(Position::new(chapter, lesson))
}

fn describe_position(pos: Position) -> String {
    format!("chapter {}, lesson {}", pos.chapter + 1, pos.lesson + 1)
}

fn describe_exam_status(status: ExamStatus) -> &'static str {
    match status {
        ExamStatus::NotRequired => "no exam",
        ExamStatus::Outstanding => "exam not taken",
        ExamStatus::AwaitingGrade => "exam awaiting grade",
        ExamStatus::Failed => "exam failed",
        ExamStatus::Passed => "exam passed",
    }
}

fn print_summary(title: &str, summary: &ProgressSummary) {
    println!(
        "{title}: {}% ({}/{} lessons)",
        summary.percentage, summary.completed_lessons, summary.total_lessons
    );
    for (i, chapter) in summary.chapters.iter().enumerate() {
        let mark = if chapter.cleared { "x" } else { " " };
        println!(
            "  [{mark}] {}. {} ({}/{}, {})",
            i + 1,
            chapter.title,
            chapter.completed_lessons,
            chapter.total_lessons,
            describe_exam_status(chapter.exam)
        );
    }
    match summary.next {
        Some(pos) => println!("Next: {}", describe_position(pos)),
        None => println!("All lessons complete."),
    }
    if summary.certificate_eligible {
        println!("Certificate available: run `coursepath certificate`.");
    }
}

fn resolve_user(cli_user: Option<&str>, app: &AppServices) -> Result<UserId> {
    if let Some(raw) = cli_user {
        return UserId::new(raw).context("invalid --user");
    }
    app.stored_login()
        .map(|login| login.user_id.clone())
        .ok_or_else(|| anyhow!("not logged in: run `coursepath login` or pass --user"))
}

async fn run(cli: Cli) -> Result<()> {
    let db_url = normalize_sqlite_url(&cli.db_url);
    prepare_sqlite_dir(&db_url)?;

    let mut config = ApiConfig::from_env();
    if let Some(url) = cli.api_url {
        config = config.with_base_url(url);
    }
    let app = AppServices::new_sqlite(&db_url, Clock::default(), &config, cli.token)
        .await
        .context("starting services")?;

    let course_arg = match &cli.command {
        Commands::Login { email, password } => {
            let record = app.auth().login(email, password).await?;
            println!("Logged in as {}.", record.user_id);
            return Ok(());
        }
        Commands::Logout => {
            app.auth().logout().await?;
            println!("Logged out.");
            return Ok(());
        }
        Commands::Status { course, .. }
        | Commands::Complete { course, .. }
        | Commands::Retry { course }
        | Commands::Next { course, .. }
        | Commands::Certificate { course } => course.clone(),
    };

    let user = resolve_user(cli.user.as_deref(), &app)?;
    let course = CourseId::new(course_arg).context("invalid course id")?;
    let sessions = app.sessions();

    if let Commands::Status { offline: true, .. } = cli.command {
        let summary = sessions.cached_summary(&user, &course).await?;
        print_summary(&format!("{course} (cached)"), &summary);
        return Ok(());
    }

    let (_closer, lifetime) = SessionLifetime::channel();
    let mut session = sessions.open(&user, &course, lifetime).await?;

    match cli.command {
        Commands::Status { .. } => {
            print_summary(session.outline().title(), &session.summary());
            for (lesson, reason) in session.failed_lessons() {
                println!("  ! {lesson} not saved: {reason} (run `coursepath retry`)");
            }
        }
        Commands::Complete { lesson, .. } => {
            let lesson = LessonId::new(lesson).context("invalid lesson id")?;
            sessions.mark_complete(&mut session, &lesson).await?;
            println!("Completed {lesson}.");
            print_summary(session.outline().title(), &session.summary());
        }
        Commands::Retry { .. } => {
            let report = sessions.retry_failed(&mut session).await?;
            for lesson in &report.committed {
                println!("Saved {lesson}.");
            }
            for (lesson, err) in &report.failed {
                let hint = if err.is_transient() { " (try again later)" } else { "" };
                println!("Still failing {lesson}: {err}{hint}");
            }
            if report.committed.is_empty() && report.failed.is_empty() {
                println!("Nothing to retry.");
            }
        }
        Commands::Next { chapter, lesson, .. } => {
            let from = parse_position(chapter, lesson)?;
            match sessions.advance(&session, from)? {
                AdvanceOutcome::LessonIncomplete => {
                    println!("Finish this lesson before moving on.");
                }
                AdvanceOutcome::ChapterIncomplete(open) => {
                    println!("Finish {} before leaving this chapter.", describe_position(open));
                }
                AdvanceOutcome::Moved(to) => println!("Next: {}", describe_position(to)),
                AdvanceOutcome::ExamRequired(exam) => {
                    let status = session.navigator().exam_status(&exam);
                    let kind = match exam.kind() {
                        ExamKind::Quiz => "quiz",
                        ExamKind::Written => "written exam",
                    };
                    println!(
                        "Pass the {kind} {} to continue ({}).",
                        exam.id(),
                        describe_exam_status(status)
                    );
                }
                AdvanceOutcome::CourseComplete => println!("Course complete."),
            }
        }
        Commands::Certificate { .. } => match sessions.request_certificate(&session).await {
            Ok(receipt) => {
                println!("Certificate issued.");
                if let Some(url) = receipt.url {
                    println!("  {url}");
                }
            }
            Err(SessionError::NotEligible { percentage }) => {
                println!("Not yet: {percentage}% of lessons complete.");
            }
            Err(err) => return Err(err.into()),
        },
        Commands::Login { .. } | Commands::Logout => {}
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("{err:#}");
        std::process::exit(2);
    }
}
