use answer_stream::{
    ChannelSink, ChatStreamRequest, ClientConfig, StreamClient, StreamEvent,
};
use clap::Parser;
use std::io::Write;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Stream an assistant answer and print it as it arrives
#[derive(Parser, Debug)]
#[command(name = "answer-stream", version, about)]
struct Cli {
    /// Message to send
    #[arg(short, long)]
    message: String,

    /// Backend model type
    #[arg(long)]
    model: Option<String>,

    #[arg(long)]
    temperature: Option<f32>,

    #[arg(long)]
    max_tokens: Option<u32>,

    #[arg(long)]
    user_id: Option<String>,

    #[arg(long)]
    system_prompt: Option<String>,

    /// Detect the answer from boilerplate phrases instead of sentinel markers
    #[arg(long)]
    legacy: bool,

    /// TOML config file; environment variables are used otherwise
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ClientConfig::from_file(path)?,
        None => ClientConfig::from_env()?,
    };
    config.validate()?;
    info!(url = %config.stream_url(), "Using chat backend");

    let mut request = ChatStreamRequest::new(cli.message).with_thinking_markers(!cli.legacy);
    request.model_type = cli.model;
    request.temperature = cli.temperature;
    request.max_tokens = cli.max_tokens;
    request.user_id = cli.user_id;
    request.system_prompt = cli.system_prompt;

    let client = StreamClient::with_http(config)?;
    let (sink, mut events) = ChannelSink::new();
    let session = client.start(request, sink)?;

    let ctrl_c_session = session.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_session.cancel();
        }
    });

    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();
    let mut failed = false;

    while let Some(event) = events.recv().await {
        match event.event {
            StreamEvent::Thinking(update) => {
                if update.rewritten {
                    writeln!(stderr)?;
                    write!(stderr, "{}", update.text)?;
                } else {
                    write!(stderr, "{}", update.delta)?;
                }
                stderr.flush()?;
            }
            StreamEvent::Answer(update) => {
                if update.rewritten {
                    writeln!(stdout)?;
                    write!(stdout, "{}", update.text)?;
                } else {
                    write!(stdout, "{}", update.delta)?;
                }
                stdout.flush()?;
            }
            StreamEvent::Complete(completion) => {
                writeln!(stdout)?;
                if let Some(tokens) = completion.token_usage {
                    info!(tokens, reason = ?completion.finish_reason, "Answer complete");
                }
                break;
            }
            StreamEvent::Error { message } => {
                writeln!(stdout)?;
                eprintln!("{}", answer_stream::view::FAILURE_NOTICE);
                eprintln!("  {}", message);
                failed = true;
                break;
            }
            StreamEvent::Cancelled => {
                writeln!(stdout)?;
                eprintln!("Cancelled.");
                break;
            }
        }
    }

    session.close();
    session.wait().await;
    info!(
        elapsed_ms = session.elapsed().as_millis() as u64,
        bytes = session.bytes_received(),
        heartbeats = session.heartbeats(),
        "Session closed"
    );
    info!("{}", client.metrics().snapshot());

    if failed {
        std::process::exit(1);
    }
    Ok(())
}
