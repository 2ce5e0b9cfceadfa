use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use meshgen_api::{ClientConfig, HttpApi, DEFAULT_API_BASE, DEFAULT_TIMEOUT_MS};
use meshgen_core::{decode, encode, random_seed, secondary, ParameterSpec, RequestDescriptor, YAML_KEY};
use meshgen_page::{NavSignal, Page, PageController, Surface, ViewPage};
use serde::Serialize;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "meshgenctl", version, about = "Drive the meshgen page controller headlessly")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Default seed used when the location carries none (random if unset)
    #[arg(long = "seed", global = true)]
    seed: Option<i64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load a location, run its requests and print what the page shows
    Render {
        /// Page location, e.g. "#random?numServices=5" or "http://host/?seed=1#define"
        location: String,
        /// Generator base URL
        #[arg(long = "api-base", env = "MESHGEN_API_BASE", default_value = DEFAULT_API_BASE)]
        api_base: String,
        /// Per-request timeout in milliseconds
        #[arg(long = "timeout-ms", env = "MESHGEN_TIMEOUT_MS", default_value_t = DEFAULT_TIMEOUT_MS)]
        timeout_ms: u64,
    },
    /// Print the canonical primary and secondary requests for a location (no network)
    Request {
        location: String,
    },
}

fn init_tracing() {
    let env = std::env::var("MESHGEN_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("MESHGEN_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid MESHGEN_METRICS_ADDR; expected host:port");
        }
    }
}

/// Primary request and, when the primary would be followed up, its manifest call.
fn describe_requests(location: &str, seed: i64) -> Result<(RequestDescriptor, RequestDescriptor)> {
    let route = decode(location)?;
    let view = route.view.ok_or_else(|| anyhow!("location {} selects no view", location))?;
    let mut page = Page::standard();
    let spec = ParameterSpec::for_view(view, seed);
    let effective = meshgen_page::sync(&mut page.view_mut(view).form, &spec, &route);
    let primary = encode(view, &effective, route.has(YAML_KEY));
    let manifest = secondary(&primary, view);
    Ok((primary, manifest))
}

#[derive(Serialize)]
struct SurfaceReport<'a> {
    visible: bool,
    class: Option<&'static str>,
    text: Option<&'a str>,
}

impl<'a> From<&'a Surface> for SurfaceReport<'a> {
    fn from(s: &'a Surface) -> Self {
        Self { visible: s.visible, class: s.artifact().map(|a| a.class.css()), text: s.text() }
    }
}

#[derive(Serialize)]
struct TargetReport<'a> {
    failure: SurfaceReport<'a>,
    success: SurfaceReport<'a>,
}

#[derive(Serialize)]
struct RenderReport<'a> {
    location: &'a str,
    request: Option<&'a RequestDescriptor>,
    primary: TargetReport<'a>,
    secondary: TargetReport<'a>,
}

fn print_surface(label: &str, s: &Surface) {
    if !s.visible {
        return;
    }
    if let Some(a) = s.artifact() {
        println!("--- {} ({})", label, a.class.css());
        println!("{}", a.text);
    }
}

fn print_view(vp: &ViewPage) {
    print_surface("primary failure", &vp.primary.failure);
    print_surface("primary", &vp.primary.success);
    print_surface("manifest failure", &vp.secondary.failure);
    print_surface("manifest", &vp.secondary.success);
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();
    let seed = cli.seed.unwrap_or_else(random_seed);

    match cli.command {
        Commands::Request { location } => {
            info!(location = %location, seed, "request invoked");
            let (primary, manifest) = describe_requests(&location, seed)?;
            match cli.output {
                Output::Human => {
                    println!("{}", primary);
                    if let Some(body) = &primary.body {
                        println!("  body: {}", body);
                    }
                    println!("{}", manifest);
                }
                Output::Json => println!("{}", serde_json::to_string_pretty(&[&primary, &manifest])?),
            }
        }
        Commands::Render { location, api_base, timeout_ms } => {
            info!(location = %location, api_base = %api_base, "render invoked");
            let view = decode(&location)?.view.ok_or_else(|| anyhow!("location {} selects no view", location))?;
            let api = Arc::new(HttpApi::new(ClientConfig { base_url: api_base, timeout_ms })?);
            let mut controller = PageController::with_page(api, Page::standard(), seed);
            controller.navigate(NavSignal::Ready, &location);
            controller.settle().await;
            let vp = controller.page().view(view);
            match cli.output {
                Output::Human => print_view(vp),
                Output::Json => {
                    let report = RenderReport {
                        location: &location,
                        request: controller.last_request(),
                        primary: TargetReport { failure: (&vp.primary.failure).into(), success: (&vp.primary.success).into() },
                        secondary: TargetReport { failure: (&vp.secondary.failure).into(), success: (&vp.secondary.success).into() },
                    };
                    println!("{}", serde_json::to_string_pretty(&report)?);
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_describes_both_calls() {
        let (p, m) = describe_requests("#random?numServices=5", 11).unwrap();
        assert_eq!(p.path, "/api/random.mmd");
        assert_eq!(p.query[0], ("numServices".to_string(), "5".to_string()));
        assert_eq!(p.query[1], ("seed".to_string(), "11".to_string()));
        assert_eq!(m.path, "/api/random.yaml");
        assert!(m.has_query("k8s"));
    }

    #[test]
    fn request_rejects_non_view_locations() {
        assert!(describe_requests("#about", 1).is_err());
    }
}
