use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tts_agents::{
    AudioFormat, BatchProcessor, Config, LogFormat, OpenAiSpeechBackend, RetryPolicy, SpeechBackend,
    SpeechModel, SpeechRequest, StreamingSynthesizer, TtsService, Voice,
};

/// Batch and streaming text-to-speech over the OpenAI TTS API.
#[derive(Parser)]
#[command(name = "tts-agents", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate speech from a single text
    Generate(GenerateArgs),
    /// Generate speech from a text file
    File(FileArgs),
    /// Process multiple texts concurrently
    Batch(BatchArgs),
    /// List available voices, models and formats
    Voices,
}

#[derive(Args)]
struct SynthesisOpts {
    /// Voice to use (alloy, echo, fable, onyx, nova, shimmer)
    #[arg(short, long)]
    voice: Option<String>,

    /// TTS model to use (tts-1, tts-1-hd)
    #[arg(short, long)]
    model: Option<String>,

    /// Audio format (mp3, opus, aac, flac)
    #[arg(short, long)]
    format: Option<String>,

    /// Speech speed (0.25-4.0)
    #[arg(short, long)]
    speed: Option<f32>,
}

impl SynthesisOpts {
    fn request(&self, text: String, config: &Config) -> anyhow::Result<SpeechRequest> {
        Ok(SpeechRequest {
            text,
            voice: match &self.voice {
                Some(raw) => raw.parse()?,
                None => config.default_voice,
            },
            model: match &self.model {
                Some(raw) => raw.parse()?,
                None => config.default_model,
            },
            format: match &self.format {
                Some(raw) => raw.parse()?,
                None => config.default_format,
            },
            speed: self.speed.unwrap_or(config.default_speed),
        })
    }
}

#[derive(Args)]
struct GenerateArgs {
    /// Text to convert to speech
    text: String,

    #[command(flatten)]
    synthesis: SynthesisOpts,

    /// Output file path
    #[arg(short, long, default_value = "output.mp3")]
    output: PathBuf,

    /// Stream the audio to disk as it arrives
    #[arg(long)]
    streaming: bool,
}

#[derive(Args)]
struct FileArgs {
    /// File containing the text to convert
    input: PathBuf,

    #[command(flatten)]
    synthesis: SynthesisOpts,

    /// Output file path
    #[arg(short, long, default_value = "output.mp3")]
    output: PathBuf,

    /// Stream the audio to disk as it arrives
    #[arg(long)]
    streaming: bool,
}

#[derive(Args)]
struct BatchArgs {
    /// Texts to convert, one audio file each
    texts: Vec<String>,

    /// File containing texts, one per line
    #[arg(long)]
    input_file: Option<PathBuf>,

    #[command(flatten)]
    synthesis: SynthesisOpts,

    /// Directory for the generated audio files
    #[arg(short, long, default_value = "./output")]
    output_dir: PathBuf,

    /// Maximum concurrent requests
    #[arg(short, long)]
    concurrent: Option<usize>,

    /// Extra attempts per failed request
    #[arg(long)]
    retry_attempts: Option<u32>,

    /// Print the batch result as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Listing voices needs no API key.
    if matches!(cli.command, Commands::Voices) {
        print_voices();
        return ExitCode::SUCCESS;
    }

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            return ExitCode::FAILURE;
        }
    };
    init_logging(&config);

    match run(cli.command, config).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            tracing::error!(error = %err, "command failed");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands, config: Config) -> anyhow::Result<bool> {
    let backend: Arc<dyn SpeechBackend> = Arc::new(OpenAiSpeechBackend::new(
        config.openai_api_key.clone(),
        config.openai_api_base.clone(),
        config.timeout,
    )?);
    let retry = RetryPolicy::new(config.max_retries).with_base_delay(config.retry_base_delay);
    let service = Arc::new(TtsService::new(backend.clone(), retry));

    match command {
        Commands::Generate(args) => {
            let request = args.synthesis.request(args.text.clone(), &config)?;
            run_single(&service, backend, retry, request, &args.output, args.streaming).await
        }
        Commands::File(args) => {
            let text = tokio::fs::read_to_string(&args.input)
                .await
                .with_context(|| format!("failed to read {:?}", args.input))?;
            let text = text.trim().to_string();
            if text.is_empty() {
                anyhow::bail!("input file {:?} is empty", args.input);
            }
            println!("Read {} characters from {:?}", text.chars().count(), args.input);
            let request = args.synthesis.request(text, &config)?;
            run_single(&service, backend, retry, request, &args.output, args.streaming).await
        }
        Commands::Batch(args) => run_batch(service, &config, args).await,
        Commands::Voices => unreachable!("handled before configuration is loaded"),
    }
}

async fn run_single(
    service: &TtsService,
    backend: Arc<dyn SpeechBackend>,
    retry: RetryPolicy,
    request: SpeechRequest,
    output: &Path,
    streaming: bool,
) -> anyhow::Result<bool> {
    if streaming {
        let synthesizer = StreamingSynthesizer::new(backend, retry);
        let path = synthesizer.stream_to_file(request, output).await?;
        println!("Audio saved to {}", path.display());
        return Ok(true);
    }

    let outcome = service.generate_speech(request, Some(output)).await?;
    if outcome.success {
        println!(
            "Audio saved to {}",
            outcome.saved_path.as_deref().unwrap_or(output).display()
        );
        if let Some(size) = outcome.byte_size {
            println!("File size: {size} bytes");
        }
        Ok(true)
    } else {
        eprintln!(
            "Generation failed: {}",
            outcome.error.as_deref().unwrap_or("unknown error")
        );
        Ok(false)
    }
}

async fn run_batch(
    service: Arc<TtsService>,
    config: &Config,
    args: BatchArgs,
) -> anyhow::Result<bool> {
    let mut texts = args.texts.clone();
    if let Some(path) = &args.input_file {
        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {path:?}"))?;
        texts.extend(
            contents
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(String::from),
        );
    }
    if texts.is_empty() {
        anyhow::bail!("no texts provided, pass them as arguments or via --input-file");
    }

    let requests = texts
        .into_iter()
        .map(|text| args.synthesis.request(text, config))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let processor = BatchProcessor::new(service, args.concurrent.unwrap_or(config.max_concurrent));
    let result = processor
        .process_batch(
            requests,
            Some(&args.output_dir),
            args.retry_attempts.unwrap_or(config.max_retries),
        )
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("Total requests:  {}", result.total_requests);
        println!("Successful:      {}", result.successful);
        println!("Failed:          {}", result.failed);
        println!("Processing time: {:.2}s", result.processing_time_secs);
        println!("Output dir:      {}", args.output_dir.display());
        if !result.errors.is_empty() {
            println!("\nErrors:");
            for error in &result.errors {
                println!("  - {error}");
            }
        }
    }

    Ok(result.failed == 0)
}

fn print_voices() {
    println!("Voices:");
    for voice in Voice::ALL {
        println!("  {voice}");
    }
    println!("Models:");
    for model in SpeechModel::ALL {
        println!("  {model}");
    }
    println!("Formats:");
    for format in AudioFormat::ALL {
        println!("  {format}");
    }
}

fn init_logging(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "tts_agents=info".into());
    if config.log_format == LogFormat::Json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }
}
