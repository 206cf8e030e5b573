//! CLI subcommand handlers.

use crate::Commands;
use crate::ConfigAction;
use attnlens_core::adapter::ModelLoader;
use attnlens_core::config::{AppConfig, ViewerConfig, init_workspace_config, load_config};
use attnlens_core::gateway::{GatewayServer, SharedGateway, run_gateway};
use attnlens_core::render::normalize_weights;
use attnlens_core::view::{ViewModel, ViewRequest, Viewer};
use attnlens_model::HubModelLoader;
use std::fmt::Write as _;
use std::path::Path;

const BAR_WIDTH: usize = 30;

/// Handle a CLI subcommand.
pub async fn handle_command(command: Commands, workspace: &Path) -> anyhow::Result<()> {
    match command {
        Commands::Config { action } => handle_config(action, workspace),
        Commands::Serve { host, port } => handle_serve(host, port, workspace).await,
        Commands::Inspect {
            sentence,
            model,
            max_len,
            layer,
            head,
            token,
        } => {
            let config = load(workspace)?;
            let defaults = ViewRequest::from_config(&config.viewer);
            let request = ViewRequest {
                sentence,
                model: model.unwrap_or(defaults.model),
                max_tokens: max_len.unwrap_or(defaults.max_tokens),
                layer,
                head,
                token: token.unwrap_or(defaults.token),
            };
            let loader = hub_loader(&config.viewer);
            let mut viewer = Viewer::new(config.viewer, loader);
            match inspect(&mut viewer, &request)? {
                Some(report) => print!("{report}"),
                None => println!("Nothing to show for an empty sentence."),
            }
            Ok(())
        }
    }
}

fn load(workspace: &Path) -> anyhow::Result<AppConfig> {
    load_config(Some(workspace), None).map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
}

fn hub_loader(config: &ViewerConfig) -> Box<dyn ModelLoader> {
    let loader = HubModelLoader::default();
    match &config.model_dir {
        Some(dir) => Box::new(loader.with_local_dir(dir)),
        None => Box::new(loader),
    }
}

fn handle_config(action: ConfigAction, workspace: &Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let (config_path, created) = init_workspace_config(workspace)?;
            if created {
                println!(
                    "Created default configuration at: {}",
                    config_path.display()
                );
            } else {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
            }
            Ok(())
        }
        ConfigAction::Show => {
            let config = load(workspace)?;
            let toml_str = toml::to_string_pretty(&config)?;
            println!("{}", toml_str);
            Ok(())
        }
    }
}

async fn handle_serve(
    host: Option<String>,
    port: Option<u16>,
    workspace: &Path,
) -> anyhow::Result<()> {
    let mut config = load(workspace)?;
    if let Some(host) = host {
        config.gateway.host = host;
    }
    if let Some(port) = port {
        config.gateway.port = port;
    }

    println!(
        "Attention viewer: http://{}:{}",
        config.gateway.host, config.gateway.port
    );
    let loader = hub_loader(&config.viewer);
    let gw: SharedGateway = std::sync::Arc::new(tokio::sync::Mutex::new(GatewayServer::new(
        config.gateway,
        Viewer::new(config.viewer, loader),
    )));
    run_gateway(gw).await?;
    Ok(())
}

/// Render one request as a plain-text report. `None` for a blank sentence.
pub fn inspect(viewer: &mut Viewer, request: &ViewRequest) -> anyhow::Result<Option<String>> {
    let Some(view) = viewer.render(request)? else {
        return Ok(None);
    };
    Ok(Some(format_report(&view)?))
}

fn format_report(view: &ViewModel) -> anyhow::Result<String> {
    let sel = view.selection;
    let mut out = String::new();

    writeln!(out, "Tokens ({}): {}", view.seq_len, view.tokens.join(" "))?;
    writeln!(
        out,
        "Model: {} layers x {} heads",
        view.num_layers, view.num_heads
    )?;
    writeln!(
        out,
        "\nLayer {} / head {}: {}",
        sel.layer, sel.head, view.head_summary
    )?;

    writeln!(
        out,
        "\nAttention from '{}' (token {}):",
        view.query_token, sel.token
    )?;
    let weights = &view.row_bar.values;
    let normalized = normalize_weights(weights)?;
    let label_width = view.tokens.iter().map(|t| t.chars().count()).max().unwrap_or(0);
    for (i, ((token, w), n)) in view.tokens.iter().zip(weights).zip(&normalized).enumerate() {
        let bar = "#".repeat((n * BAR_WIDTH as f32).round() as usize);
        writeln!(
            out,
            "{i:>4}  {token:<label_width$}  {w:.3}  {bar}"
        )?;
    }

    writeln!(out, "\nHeads of layer {}:", sel.layer)?;
    for panel in &view.head_grid {
        writeln!(out, "  head {:>2}: {}", panel.head, panel.summary)?;
    }
    Ok(out)
}
