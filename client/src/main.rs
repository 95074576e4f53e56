use clap::{Parser, Subcommand};
use client::animations::Animation;
use client::input::run_interactive;
use client::network::ServoClient;
use log::{info, warn};
use shared::{DEFAULT_PORT, DEFAULT_SERVO_COUNT};

#[derive(Parser, Debug)]
#[command(author, version, about = "Remote control for the servo server", long_about = None)]
struct Args {
    /// Server host name or IP address
    host: String,

    /// Server port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Number of servos the animations drive
    #[arg(short, long, default_value_t = DEFAULT_SERVO_COUNT)]
    servos: usize,

    #[command(subcommand)]
    mode: Option<Mode>,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Type commands at a prompt (default)
    Interactive,
    /// Play an animation
    Animate {
        #[arg(value_enum)]
        animation: Animation,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let addr = format!("{}:{}", args.host, args.port);

    info!("Connecting to {}", addr);
    let mut client = ServoClient::connect(addr.as_str()).await?;

    match args.mode.unwrap_or(Mode::Interactive) {
        Mode::Interactive => run_interactive(&mut client).await?,
        Mode::Animate { animation } => {
            tokio::select! {
                result = animation.run(&mut client, args.servos) => result?,
                _ = tokio::signal::ctrl_c() => {
                    warn!("Stopped by user");
                    // The interrupted request may still have a reply in flight
                    let mut cleanup = ServoClient::connect(addr.as_str()).await?;
                    cleanup.center().await?;
                    cleanup.release_all().await?;
                }
            }
        }
    }

    info!("Done");
    Ok(())
}
