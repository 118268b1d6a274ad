//! ssr-engine CLI entry point.
//!
//! Serves a WebAssembly application over HTTP, renders single URLs, and
//! precompiles modules for `precompiled = true` deployments.

mod cli;

use std::path::Path;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ssr_engine_common::ConfigFile;
use ssr_engine_core::{CompiledModule, RenderContext, RenderRequest, ResponseHandle, WasmEngine};
use ssr_engine_server::{AppState, ServerConfig, SsrServer};

use crate::cli::{CliArgs, Command, CompileArgs, RenderArgs, ServeArgs, parse_header};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so `render` output stays clean
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,ssr_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = CliArgs::parse();
    let config = match &args.config_file {
        Some(path) => ConfigFile::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ConfigFile::default(),
    };

    match args.command {
        Command::Serve(serve_args) => serve(config, serve_args).await,
        Command::Render(render_args) => render(config, render_args).await,
        Command::Compile(compile_args) => compile(&config, &compile_args),
    }
}

async fn serve(config: ConfigFile, args: ServeArgs) -> anyhow::Result<()> {
    let mut server_config = ServerConfig::from_file(&config.server)?;
    if let Some(bind) = args.bind {
        server_config = server_config.with_bind_addr(bind);
    }

    let state = AppState::new(&config).context("Failed to configure application")?;

    info!(
        bind_addr = %server_config.bind_addr,
        module = %config.app.name,
        template = %config.app.template.display(),
        "Configuration loaded"
    );
    info!("Server initialized. Available endpoints:");
    info!("  GET  /health              - Health check");
    info!("  GET  /ready               - Readiness check");
    info!("  *    /*                   - Render page");

    SsrServer::with_state(state, server_config).run().await?;

    Ok(())
}

async fn render(mut config: ConfigFile, args: RenderArgs) -> anyhow::Result<()> {
    if let Some(module) = &args.module {
        config.app.module = Some(module.clone());
    }
    if let Some(template) = &args.template {
        config.app.template.clone_from(template);
    }
    config.app.aot |= args.aot;
    config.app.precompiled |= args.precompiled;

    let state = AppState::new(&config).context("Failed to configure application")?;

    let mut request = RenderRequest::get(&args.url);
    for raw in &args.headers {
        let (name, value) =
            parse_header(raw).with_context(|| format!("Invalid header '{raw}'"))?;
        request = request.with_header(name, value);
    }

    let ticker = state.wasm().and_then(WasmEngine::spawn_epoch_ticker);
    let response = ResponseHandle::new();
    let result = state
        .render()
        .render_to_string(
            state.template(),
            RenderContext::with_response(request, response.clone()),
        )
        .await;
    if let Some(ticker) = ticker {
        ticker.abort();
    }

    let html = result.with_context(|| format!("Failed to render {}", args.url))?;
    info!(url = %args.url, status = response.status(), "Rendered");
    println!("{html}");

    Ok(())
}

fn compile(config: &ConfigFile, args: &CompileArgs) -> anyhow::Result<()> {
    let engine = WasmEngine::new(&config.runtime.engine)?;
    let module = compile_source(&engine, &args.module)?;
    let artifact = module.serialize()?;

    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("Failed to create {}", args.out_dir.display()))?;
    let out = args.out_dir.join(module.artifact_name());
    std::fs::write(&out, artifact).with_context(|| format!("Failed to write {}", out.display()))?;

    info!(
        module = %args.module.display(),
        artifact = %out.display(),
        "Module precompiled"
    );
    println!("{}", out.display());

    Ok(())
}

fn compile_source(engine: &WasmEngine, path: &Path) -> anyhow::Result<CompiledModule> {
    if path.extension().is_some_and(|ext| ext == "wat") {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(CompiledModule::from_wat(engine.inner(), &text)?)
    } else {
        let bytes =
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(CompiledModule::from_bytes(engine.inner(), &bytes)?)
    }
}
