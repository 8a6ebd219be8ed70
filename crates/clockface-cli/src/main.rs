use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

// D-Bus proxy — `#[zbus::proxy]` generates the async `TimeclockProxy` used
// below.
#[zbus::proxy(
    interface = "io.clockface.Timeclock1",
    default_service = "io.clockface.Timeclock1",
    default_path = "/io/clockface/Timeclock1"
)]
trait Timeclock {
    async fn verify(&self, request: &str) -> zbus::Result<String>;
    async fn enroll_profile(&self, employee: &str, descriptor: &str) -> zbus::Result<String>;
    async fn reset_profile(&self, employee: &str) -> zbus::Result<bool>;
    async fn liveness_start(&self) -> zbus::Result<String>;
    async fn liveness_sample(&self, session: &str, x: f64, y: f64) -> zbus::Result<String>;
    async fn liveness_miss(&self, session: &str) -> zbus::Result<String>;
    async fn liveness_cancel(&self, session: &str) -> zbus::Result<bool>;
    async fn work_hours(&self, employee: &str, start: &str, end: &str) -> zbus::Result<String>;
    async fn monthly_summary(&self, employee: &str, year: i32, month: u32)
        -> zbus::Result<String>;
    async fn record_leave(&self, employee: &str, date: &str) -> zbus::Result<bool>;
    async fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "clockface", about = "Clockface attendance CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    CheckIn,
    CheckOut,
}

impl Mode {
    fn as_wire(self) -> &'static str {
        match self {
            Mode::CheckIn => "check_in",
            Mode::CheckOut => "check_out",
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll (or replace) an employee's face profile from a descriptor file
    Enroll {
        /// Employee identifier
        employee: String,
        /// Path to a JSON file holding the 128-float descriptor
        #[arg(short, long)]
        file: String,
    },
    /// Delete an employee's face profile
    Reset {
        employee: String,
    },
    /// Resolve an attendance event from a descriptor file and a passed
    /// liveness session
    Verify {
        /// check-in or check-out
        #[arg(value_enum)]
        mode: Mode,
        /// Path to a JSON file holding the 128-float descriptor
        #[arg(short, long)]
        file: String,
        /// Liveness session id from `liveness start`
        #[arg(short, long)]
        session: String,
    },
    /// Drive a liveness session by hand
    #[command(subcommand)]
    Liveness(LivenessCommands),
    /// Daily work-hours records for a date or range
    Hours {
        employee: String,
        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        start: String,
        /// End date (YYYY-MM-DD); defaults to start
        #[arg(long)]
        end: Option<String>,
    },
    /// Monthly attendance summary
    Summary {
        employee: String,
        year: i32,
        month: u32,
    },
    /// Record an approved leave day
    Leave {
        employee: String,
        /// Leave date (YYYY-MM-DD)
        date: String,
    },
    /// Show daemon status
    Status,
}

#[derive(Subcommand)]
enum LivenessCommands {
    /// Start a session and print its id
    Start,
    /// Feed one centroid sample
    Sample {
        session: String,
        x: f64,
        y: f64,
    },
    /// Register a tick with no detected face
    Miss {
        session: String,
    },
    /// Cancel a session
    Cancel {
        session: String,
    },
}

fn read_descriptor(path: &str) -> Result<String> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading descriptor file {path}"))?;
    // Validate locally so a malformed file fails with a good message
    // instead of a D-Bus InvalidArgs.
    let values: Vec<f32> =
        serde_json::from_str(&raw).with_context(|| format!("parsing descriptor file {path}"))?;
    Ok(serde_json::to_string(&values)?)
}

fn print_pretty(json: &str) -> Result<()> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let conn = zbus::Connection::system()
        .await
        .context("connecting to the system bus (is clockfaced running?)")?;
    let proxy = TimeclockProxy::new(&conn).await?;

    match cli.command {
        Commands::Enroll { employee, file } => {
            let descriptor = read_descriptor(&file)?;
            let response = proxy.enroll_profile(&employee, &descriptor).await?;
            print_pretty(&response)?;
        }
        Commands::Reset { employee } => {
            let removed = proxy.reset_profile(&employee).await?;
            if removed {
                println!("profile removed for {employee}");
            } else {
                println!("no profile enrolled for {employee}");
            }
        }
        Commands::Verify {
            mode,
            file,
            session,
        } => {
            let descriptor = read_descriptor(&file)?;
            let request = format!(
                r#"{{"descriptor": {descriptor}, "mode": "{}", "liveness_session": "{session}"}}"#,
                mode.as_wire()
            );
            let response = proxy.verify(&request).await?;
            print_pretty(&response)?;

            let value: serde_json::Value = serde_json::from_str(&response)?;
            if value["success"] != serde_json::Value::Bool(true) {
                bail!("attendance attempt rejected");
            }
        }
        Commands::Liveness(cmd) => match cmd {
            LivenessCommands::Start => {
                let response = proxy.liveness_start().await?;
                print_pretty(&response)?;
            }
            LivenessCommands::Sample { session, x, y } => {
                let response = proxy.liveness_sample(&session, x, y).await?;
                print_pretty(&response)?;
            }
            LivenessCommands::Miss { session } => {
                let response = proxy.liveness_miss(&session).await?;
                print_pretty(&response)?;
            }
            LivenessCommands::Cancel { session } => {
                let cancelled = proxy.liveness_cancel(&session).await?;
                println!("{}", if cancelled { "cancelled" } else { "unknown session" });
            }
        },
        Commands::Hours {
            employee,
            start,
            end,
        } => {
            let end = end.unwrap_or_else(|| start.clone());
            let response = proxy.work_hours(&employee, &start, &end).await?;
            print_pretty(&response)?;
        }
        Commands::Summary {
            employee,
            year,
            month,
        } => {
            let response = proxy.monthly_summary(&employee, year, month).await?;
            print_pretty(&response)?;
        }
        Commands::Leave { employee, date } => {
            proxy.record_leave(&employee, &date).await?;
            println!("leave recorded for {employee} on {date}");
        }
        Commands::Status => {
            let response = proxy.status().await?;
            print_pretty(&response)?;
        }
    }

    Ok(())
}
