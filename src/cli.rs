use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint};

/// Command-line arguments for the ssr-engine binary.
#[derive(Debug, Parser)]
#[command(name = "ssr-engine", version, about = "Per-request server-side rendering engine")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config",
        env = "SSR_ENGINE_CONFIG",
        value_name = "PATH",
        value_hint = ValueHint::FilePath,
        global = true
    )]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve the application over HTTP.
    Serve(ServeArgs),
    /// Render a single URL and print the document to stdout.
    Render(RenderArgs),
    /// Precompile a module into a `.cwasm` artifact.
    Compile(CompileArgs),
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Override the bind address.
    #[arg(long, env = "BIND_ADDR", value_name = "ADDR")]
    pub bind: Option<SocketAddr>,
}

#[derive(Debug, Args)]
pub struct RenderArgs {
    /// URL to render (path and query).
    #[arg(long, default_value = "/")]
    pub url: String,

    /// Override the WebAssembly module.
    #[arg(long, value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub module: Option<PathBuf>,

    /// Override the shell template.
    #[arg(long, value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub template: Option<PathBuf>,

    /// Compile the module once up front.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub aot: bool,

    /// Treat the module as a precompiled artifact.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub precompiled: bool,

    /// Request header as `name: value`; may be repeated.
    #[arg(long = "header", short = 'H', value_name = "HEADER")]
    pub headers: Vec<String>,
}

#[derive(Debug, Args)]
pub struct CompileArgs {
    /// WebAssembly module (`.wasm` or `.wat`).
    #[arg(value_name = "MODULE", value_hint = ValueHint::FilePath)]
    pub module: PathBuf,

    /// Directory the artifact is written to, named after its content hash.
    #[arg(long, default_value = ".", value_name = "DIR", value_hint = ValueHint::DirPath)]
    pub out_dir: PathBuf,
}

/// Split a `name: value` header argument.
pub fn parse_header(raw: &str) -> Option<(&str, &str)> {
    let (name, value) = raw.split_once(':')?;
    let name = name.trim();
    (!name.is_empty()).then_some((name, value.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_render_args() {
        let args = CliArgs::try_parse_from([
            "ssr-engine",
            "render",
            "--url",
            "/products/42",
            "--module",
            "shop.wasm",
            "-H",
            "accept-language: de",
        ])
        .unwrap();

        let Command::Render(render) = args.command else {
            panic!("expected render command");
        };
        assert_eq!(render.url, "/products/42");
        assert_eq!(render.module, Some(PathBuf::from("shop.wasm")));
        assert_eq!(render.headers, vec!["accept-language: de"]);
    }

    #[test]
    fn test_parse_header() {
        assert_eq!(parse_header("X-User: ada"), Some(("X-User", "ada")));
        assert_eq!(parse_header("x-empty:"), Some(("x-empty", "")));
        assert_eq!(parse_header("no-colon"), None);
        assert_eq!(parse_header(": value"), None);
    }
}
