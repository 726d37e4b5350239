mod cli;

use camrelay::{
    config,
    conversion::SupervisorOptions,
    playback::{TerminalCommand, TerminalSurface},
    server::{self, AppContext},
    session::{PlayRequest, SessionEvent, SessionOrchestrator},
};
use camrelay_av::{check_tools as probe_tools, FfmpegEngineFactory};
use camrelay_common::urls::redact_credentials;
use camrelay_common::{Camera, CameraSources};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use futures::StreamExt;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;
use tokio_util::sync::CancellationToken;

struct PlayArgs {
    front: String,
    rear: Option<String>,
    camera: Option<Camera>,
    title: Option<String>,
    api_base_url: Option<String>,
}

async fn play(args: PlayArgs, config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;

    std::fs::create_dir_all(&config.conversion.output_root).with_context(|| {
        format!(
            "Failed to create output root {:?}",
            config.conversion.output_root
        )
    })?;

    let factory = Arc::new(FfmpegEngineFactory::new(config.engine.clone()));
    let orchestrator = Arc::new(SessionOrchestrator::new(
        factory,
        SupervisorOptions::from_config(&config),
    ));

    // Bind before starting the session so playlist URLs are reachable
    let listener = server::bind(&config).await?;
    let server_stop = CancellationToken::new();
    let ctx = AppContext {
        config: Arc::new(config.clone()),
        orchestrator: orchestrator.clone(),
    };
    let server_handle = {
        let stop = server_stop.clone();
        tokio::spawn(server::serve(listener, ctx, async move {
            stop.cancelled().await
        }))
    };

    let sources = CameraSources::new(args.front.clone(), args.rear.as_deref());
    let mut request = PlayRequest::with_defaults(sources, &config.session);
    if let Some(camera) = args.camera {
        request = request.camera(camera);
    }
    if let Some(title) = args.title {
        request = request.title(title);
    }
    if let Some(api_base_url) = args.api_base_url {
        request = request.api_base_url(api_base_url);
    }

    tracing::info!("Starting session for {}", redact_credentials(&args.front));

    let (surface, remote) = TerminalSurface::new();
    let mut events = match orchestrator.play(request, Box::new(surface)).await {
        Ok(events) => events,
        Err(e) => {
            server_stop.cancel();
            let _ = server_handle.await;
            return Err(e).context("Failed to start session");
        }
    };

    println!("{}", TerminalCommand::help());

    let mut stdin = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let shutdown = server::shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            event = events.next() => match event {
                Some(event) => {
                    print_event(&event)?;
                    if event == SessionEvent::Closed {
                        break;
                    }
                }
                None => break,
            },
            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match TerminalCommand::parse(&line) {
                    Some(TerminalCommand::Switch(camera)) => {
                        if !remote.request_switch(camera) {
                            println!("No other camera to switch to");
                        }
                    }
                    Some(TerminalCommand::Record) => {
                        remote.action("record");
                    }
                    Some(TerminalCommand::Stats) => {
                        let stats = orchestrator.get_stats().await;
                        println!("{}", serde_json::to_string_pretty(&stats)?);
                    }
                    Some(TerminalCommand::Quit) => {
                        remote.close();
                    }
                    Some(TerminalCommand::Help) => println!("{}", TerminalCommand::help()),
                    Some(TerminalCommand::Unknown(command)) => {
                        println!("Unknown command: {}", command);
                        println!("{}", TerminalCommand::help());
                    }
                    None => {}
                },
                Ok(None) => stdin_open = false,
                Err(e) => {
                    tracing::warn!("Failed to read stdin: {}", e);
                    stdin_open = false;
                }
            },
            _ = &mut shutdown => break,
        }
    }

    tracing::info!("Shutting down...");
    orchestrator.stop().await;
    server_stop.cancel();

    match server_handle.await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!("Server task failed: {}", e);
            Ok(())
        }
    }
}

fn print_event(event: &SessionEvent) -> Result<()> {
    println!("{}", serde_json::to_string(event)?);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "camrelay=trace,camrelay_av=trace,camrelay_common=debug,tower_http=debug".to_string()
        } else {
            "camrelay=debug,camrelay_av=debug,tower_http=info".to_string()
        }
    });

    // stdout carries session events
    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Play {
            front,
            rear,
            camera,
            title,
            api_base_url,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            let args = PlayArgs {
                front,
                rear,
                camera,
                title,
                api_base_url,
            };
            rt.block_on(play(args, cli.config.as_deref()))
        }
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("camrelay {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    println!("Checking external tools...\n");

    let config = config::load_config_or_default(config_path)?;
    let tools = probe_tools(&config.engine.program());
    let ffmpeg_ok = tools.first().map(|t| t.available).unwrap_or(false);

    for tool in &tools {
        let status = if tool.available { "✓" } else { "✗" };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version.lines().next().unwrap_or(""));
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if ffmpeg_ok {
        println!("All required tools are available!");
    } else {
        println!("ffmpeg is missing. Install it to enable conversion.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            println!("  Server: {}:{}", config.server.host, config.server.port);
            println!("  HLS base URL: {}", config.server.hls_base_url());
            println!("  Output root: {}", config.conversion.output_root.display());
            println!(
                "  Timeouts: start {}s, switch {}s",
                config.conversion.start_timeout_secs, config.conversion.switch_timeout_secs
            );
            println!("  Switch policy: {:?}", config.conversion.switch_policy);
            println!("  ffmpeg: {}", config.engine.program().display());
        }
        None => {
            println!("No config file specified, using defaults");
            let config = config::Config::default();
            println!("Default config:");
            println!("  Server: {}:{}", config.server.host, config.server.port);
            println!("  Output root: {}", config.conversion.output_root.display());
        }
    }

    Ok(())
}
