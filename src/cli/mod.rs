//! Command-line interface for autotag.
//!
//! Runs the upload server and exposes each pipeline stage on its own so it
//! can be exercised by hand: album provisioning, site rebuild, manifest
//! generation, transcription, the photo agent and a full dispatch.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::adapters::{CommandSiteGenerator, OpenAiClient, SiteGenerator};
use crate::agent::{AgentInvocation, AgentRunner, PhotoAgent};
use crate::config::{self, ResolvedConfig};
use crate::core::{Dispatched, Dispatcher, ImagePipeline, VoicePipeline};
use crate::domain::{AlbumSource, UploadCompleted};
use crate::ingest::transcriber_from_config;
use crate::library::{AlbumProvisioner, ManifestGenerator};
use crate::server::TransferServer;

/// autotag - FTPS photo drop with voice-driven sharing
#[derive(Parser, Debug)]
#[command(name = "autotag")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the FTPS upload server
    Serve,

    /// Create an album (today's when no name is given) and print its path
    Album {
        /// Album name, slugified into the directory name
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Rebuild the site and refresh album manifests
    Rebuild,

    /// Write data.json listings for every album
    Manifest,

    /// Transcribe an audio file
    Transcribe {
        /// Audio file (WAV)
        file: PathBuf,
    },

    /// Run the photo agent on an instruction
    Agent {
        /// Photo the instruction is about
        #[arg(short, long)]
        photo: PathBuf,

        /// What to do with the photo
        instruction: String,
    },

    /// Handle a file as if it had just been uploaded
    Dispatch {
        /// Uploaded file
        file: PathBuf,
    },

    /// Show current configuration
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Serve => serve().await,
            Commands::Album { name } => create_album(name).await,
            Commands::Rebuild => rebuild().await,
            Commands::Manifest => generate_manifests().await,
            Commands::Transcribe { file } => transcribe(&file).await,
            Commands::Agent { photo, instruction } => run_agent(photo, instruction).await,
            Commands::Dispatch { file } => dispatch(file).await,
            Commands::Config => show_config().await,
        }
    }
}

fn site_generator(cfg: &ResolvedConfig) -> Arc<dyn SiteGenerator> {
    Arc::new(CommandSiteGenerator::from_config(
        &cfg.site,
        cfg.safety.rebuild_timeout(),
    ))
}

fn manifest_generator(cfg: &ResolvedConfig) -> Result<Option<ManifestGenerator>> {
    cfg.site
        .manifest
        .as_ref()
        .map(|settings| ManifestGenerator::from_config(settings, cfg.albums.timezone))
        .transpose()
        .context("Invalid manifest configuration")
}

fn photo_agent(cfg: &ResolvedConfig) -> Result<PhotoAgent> {
    let provider = OpenAiClient::from_config(&cfg.openai)?;
    Ok(PhotoAgent::new(Arc::new(provider), cfg.safety.clone()))
}

/// Assemble the dispatcher and both pipelines from configuration.
/// Fails when the public base URL is not set.
pub fn build_dispatcher(cfg: &ResolvedConfig) -> Result<Dispatcher> {
    let base_url = cfg.require_base_url()?;

    let mut image = ImagePipeline::new(site_generator(cfg));
    if let Some(manifest) = manifest_generator(cfg)? {
        image = image.with_manifest(manifest);
    }

    let voice = VoicePipeline::new(
        transcriber_from_config(cfg)?,
        Arc::new(photo_agent(cfg)?),
        base_url,
    )
    .with_photo_extension(&cfg.voice.photo_extension)
    .require_paired_photo(cfg.voice.require_paired_photo)
    .with_limits(cfg.safety.clone());

    Ok(Dispatcher::new(image, voice).with_dispatch_timeout(cfg.safety.dispatch_timeout()))
}

async fn serve() -> Result<()> {
    let cfg = config::config()?;
    // The server never starts without the account credential
    cfg.server.require_password()?;
    let dispatcher = Arc::new(build_dispatcher(cfg)?);
    TransferServer::from_config(cfg, dispatcher)?.run().await
}

async fn create_album(name: Option<String>) -> Result<()> {
    let cfg = config::config()?;
    let provisioner = AlbumProvisioner::from_config(&cfg.albums);

    let album = provisioner
        .resolve(&AlbumSource::from_option(name))
        .await
        .context("Failed to provision album")?;

    if album.created {
        eprintln!("Created album '{}'", album.title);
    } else {
        eprintln!("Album '{}' already exists", album.title);
    }
    println!("{}", album.path.display());
    Ok(())
}

async fn rebuild() -> Result<()> {
    let cfg = config::config()?;
    site_generator(cfg)
        .regenerate()
        .await
        .context("Site rebuild failed")?;
    eprintln!("Site rebuilt");

    match manifest_generator(cfg)? {
        Some(generator) => write_manifests(generator).await,
        None => Ok(()),
    }
}

async fn generate_manifests() -> Result<()> {
    let cfg = config::config()?;
    let generator = manifest_generator(cfg)?
        .context("No manifest configured (site.manifest in config.yaml)")?;
    write_manifests(generator).await
}

async fn write_manifests(generator: ManifestGenerator) -> Result<()> {
    let report = tokio::task::spawn_blocking(move || generator.generate_all())
        .await
        .context("Manifest task panicked")??;

    for path in &report.written {
        println!("{}", path.display());
    }
    eprintln!(
        "Manifests: {} written, {} skipped, {} failed",
        report.written.len(),
        report.skipped,
        report.failed
    );
    Ok(())
}

async fn transcribe(file: &Path) -> Result<()> {
    let cfg = config::config()?;
    let transcriber = transcriber_from_config(cfg)?;

    let transcript = transcriber
        .transcribe(file)
        .await
        .with_context(|| format!("Failed to transcribe {}", file.display()))?;

    println!("Transcription: {}", transcript.text);
    Ok(())
}

async fn run_agent(photo: PathBuf, instruction: String) -> Result<()> {
    let cfg = config::config()?;
    let base_url = cfg.require_base_url()?.to_string();
    cfg.safety.validate_instruction(&instruction)?;

    let agent = photo_agent(cfg)?;
    let outcome = agent
        .run(&AgentInvocation {
            photo_path: photo,
            base_url,
            instruction,
        })
        .await?;

    for action in &outcome.actions {
        eprintln!("  {:?} {} -> {}", action.scope, action.target, action.success);
    }
    println!("{}", outcome.result);
    Ok(())
}

async fn dispatch(file: PathBuf) -> Result<()> {
    let cfg = config::config()?;
    let dispatcher = build_dispatcher(cfg)?;

    match dispatcher.dispatch(UploadCompleted::new(&file)).await? {
        Dispatched::Rebuilt => println!("Site rebuilt for {}", file.display()),
        Dispatched::Voice(outcome) => {
            println!("Transcription: {}", outcome.transcript);
            println!("{}", outcome.agent.result);
        }
        Dispatched::Skipped => println!("No pipeline for {}", file.display()),
    }
    Ok(())
}

async fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("autotag configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!(
        "Base URL:    {}",
        cfg.base_url.as_deref().unwrap_or("(not set)")
    );
    println!();
    println!("Server:");
    println!("  Bind:          {}", cfg.server.bind);
    println!("  User:          {}", cfg.server.username);
    println!(
        "  Password:      {}",
        if cfg.server.password.is_some() { "set" } else { "not set" }
    );
    println!(
        "  Passive ports: {}-{}",
        cfg.server.passive_ports.start(),
        cfg.server.passive_ports.end()
    );
    if let Some(address) = cfg.server.passive_address {
        println!("  Passive addr:  {}", address);
    }
    println!("  Certificate:   {}", cfg.server.cert_path.display());
    println!("  Private key:   {}", cfg.server.key_path.display());
    println!();
    println!("Albums:");
    println!("  Galleries:  {}", cfg.albums.galleries_dir.display());
    println!("  Timezone:   {}", cfg.albums.timezone.name());
    println!("  Categories: {}", cfg.albums.categories.join(", "));
    println!();
    println!("Site:");
    println!("  Command:     {}", cfg.site.command.join(" "));
    println!("  Working dir: {}", cfg.site.working_dir.display());
    match &cfg.site.manifest {
        Some(manifest) => println!(
            "  Manifest:    {} -> {}",
            manifest.source.display(),
            manifest.output.display()
        ),
        None => println!("  Manifest:    (disabled)"),
    }
    println!();
    println!("Voice:");
    println!("  Transcription: {:?}", cfg.transcription);
    println!("  Chat model:    {} ({})", cfg.openai.chat_model, cfg.openai.base_url);
    println!(
        "  API key:       {}",
        if cfg.openai.api_key.is_some() { "set" } else { "not set" }
    );
    println!("  Photo ext:     {}", cfg.voice.photo_extension);
    println!();
    println!("Safety limits:");
    println!("  Agent steps:       {}", cfg.safety.max_agent_steps);
    println!("  Instruction size:  {} bytes", cfg.safety.max_instruction_bytes);
    println!("  Model call:        {}s", cfg.safety.model_call_timeout_seconds);
    println!("  Agent run:         {}s", cfg.safety.agent_timeout_seconds);
    println!("  Transcription:     {}s", cfg.safety.transcription_timeout_seconds);
    println!("  Site rebuild:      {}s", cfg.safety.rebuild_timeout_seconds);

    Ok(())
}
