use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures_util::StreamExt;

#[derive(Parser)]
#[command(name = "emosense", about = "Emosense emotion sensing CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream live emotion readings from the daemon
    Watch,
    /// Show daemon status
    Status,
    /// Show the latest emotion reading
    Current,
    /// Show recent emotion readings
    Recent {
        /// Number of readings to fetch
        #[arg(short, long, default_value_t = 10)]
        count: u32,
    },
    /// Show aggregate statistics over the recent history
    Summary,
    /// Trigger a one-shot detection
    Detect,
    /// Run camera diagnostics (bypasses the daemon)
    Test {
        /// V4L2 device path
        #[arg(short, long, default_value = "/dev/video0")]
        device: String,
    },
}

#[zbus::proxy(
    interface = "org.emosense.Emosense1",
    default_service = "org.emosense.Emosense1",
    default_path = "/org/emosense/Emosense1"
)]
trait Emosense {
    async fn status(&self) -> zbus::Result<String>;
    async fn current(&self) -> zbus::Result<String>;
    async fn recent(&self, count: u32) -> zbus::Result<String>;
    async fn summary(&self) -> zbus::Result<String>;
    async fn detect_once(&self) -> zbus::Result<bool>;

    #[zbus(signal)]
    fn emotion_detected(&self, payload: String) -> zbus::Result<()>;
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Watch => watch().await?,
        Commands::Status => print_json(&proxy().await?.status().await?),
        Commands::Current => print_json(&proxy().await?.current().await?),
        Commands::Recent { count } => print_json(&proxy().await?.recent(count).await?),
        Commands::Summary => print_json(&proxy().await?.summary().await?),
        Commands::Detect => {
            if proxy().await?.detect_once().await? {
                println!("detection requested");
            } else {
                println!("daemon pipeline is not running");
            }
        }
        Commands::Test { device } => camera_test(&device)?,
    }

    Ok(())
}

async fn proxy() -> Result<EmosenseProxy<'static>> {
    let connection = zbus::Connection::session()
        .await
        .context("connecting to session bus")?;
    EmosenseProxy::new(&connection)
        .await
        .context("connecting to emosensed (is the daemon running?)")
}

async fn watch() -> Result<()> {
    let proxy = proxy().await?;
    let mut stream = proxy.receive_emotion_detected().await?;

    println!("watching for emotion readings (ctrl-c to stop)...");
    while let Some(signal) = stream.next().await {
        let args = signal.args()?;
        match serde_json::from_str::<serde_json::Value>(args.payload()) {
            Ok(event) => {
                let emotion = event["emotion"].as_str().unwrap_or("?");
                let confidence = event["confidence"].as_f64().unwrap_or(0.0);
                let timestamp = event["timestamp"].as_str().unwrap_or("");
                println!("{timestamp}  {emotion:<10} {:.1}%", confidence * 100.0);
            }
            Err(_) => println!("{}", args.payload()),
        }
    }

    Ok(())
}

/// Pretty-print a JSON payload, falling back to the raw string.
fn print_json(payload: &str) {
    match serde_json::from_str::<serde_json::Value>(payload) {
        Ok(value) => match serde_json::to_string_pretty(&value) {
            Ok(pretty) => println!("{pretty}"),
            Err(_) => println!("{payload}"),
        },
        Err(_) => println!("{payload}"),
    }
}

/// Direct camera diagnostics: list devices, open, grab one frame.
fn camera_test(device: &str) -> Result<()> {
    use emosense_hw::{frame, Camera};

    println!("available capture devices:");
    for info in Camera::list_devices() {
        println!("  {}  {} ({})", info.path, info.name, info.driver);
    }

    let camera = Camera::open(device).with_context(|| format!("opening {device}"))?;
    println!(
        "opened {} at {}x{} ({:?})",
        camera.device_path, camera.width, camera.height, camera.fourcc
    );

    let captured = camera.capture_frame().context("capturing frame")?;
    let brightness = frame::avg_brightness(&captured.data);
    let dark = frame::is_dark_frame(&captured.data, 0.95);
    println!(
        "frame {}: {}x{}, avg brightness {brightness:.1}{}",
        captured.sequence,
        captured.width,
        captured.height,
        if dark { " (dark)" } else { "" }
    );

    Ok(())
}
