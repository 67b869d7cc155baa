//! Serve command implementation.
//!
//! Orchestrates the whole serve session:
//! - Load options from every source and validate them once
//! - Start the orchestrator (port, TLS, bind, build watcher)
//! - Print the banner and optionally open a browser
//! - Stop gracefully on Ctrl+C

use crate::cli::ServeArgs;
use crate::config::ServeOptions;
use crate::error::Result;
use crate::serve::{ServeConfig, ServeHandle, ServeOrchestrator};
use crate::ui;
use tokio::signal;

/// Execute the serve command.
///
/// # Errors
///
/// Returns errors for:
/// - Invalid configuration or TLS material
/// - An explicitly requested port that is busy
/// - Bind or file watcher failures
/// - A fatal server error while running
pub async fn execute(args: ServeArgs) -> Result<()> {
    let resolved = ServeOptions::load(&args)?;
    let config = ServeConfig::from_resolved(resolved)?;

    let details = banner_details(&config);
    let open = config.open;

    ui::info("Starting development server...");
    let handle = ServeOrchestrator::new(config).start().await?;

    ui::print_serve_banner(handle.url(), &details);

    if open {
        open_browser(handle.url());
    }

    ui::info("Press Ctrl+C to stop");

    wait_for_exit(&handle).await;

    ui::info("Shutting down development server...");
    handle.stop().await?;
    ui::success("Development server stopped");
    Ok(())
}

async fn wait_for_exit(handle: &ServeHandle) {
    tokio::select! {
        result = signal::ctrl_c() => {
            if let Err(e) = result {
                ui::warning(&format!("Failed to listen for Ctrl+C: {}", e));
            }
        }
        _ = handle.closed() => {
            ui::warning("Server stopped unexpectedly");
        }
    }
}

fn banner_details(config: &ServeConfig) -> Vec<(String, String)> {
    let mut details = Vec::new();

    let build = match &config.build_command {
        Some(command) if !config.use_dist => command.clone(),
        _ => format!("serving {}", config.out_dir.display()),
    };
    details.push(("build".to_string(), build));

    for rule in &config.proxy_rules {
        details.push(("proxy".to_string(), format!("{} -> {}", rule.pattern, rule.target)));
    }

    let reload = match (config.live_reload, config.hmr) {
        (_, true) => "hmr",
        (true, false) => "live reload",
        (false, false) => "off",
    };
    details.push(("reload".to_string(), reload.to_string()));

    if !config.rebuilds() {
        details.push(("watch".to_string(), "off".to_string()));
    }

    details
}

/// Open the server URL in the default browser.
///
/// Uses platform-specific commands:
/// - macOS: `open`
/// - Windows: `start`
/// - Linux: `xdg-open`
fn open_browser(url: &str) {
    use std::process::Command;

    let result = if cfg!(target_os = "macos") {
        Command::new("open").arg(url).spawn()
    } else if cfg!(target_os = "windows") {
        Command::new("cmd").args(["/C", "start", url]).spawn()
    } else {
        Command::new("xdg-open").arg(url).spawn()
    };

    match result {
        Ok(_) => ui::info(&format!("Opened browser at {}", url)),
        Err(e) => ui::warning(&format!("Failed to open browser: {}", e)),
    }
}
