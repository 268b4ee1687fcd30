use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time;
use tracing_subscriber::EnvFilter;

use speedmon::api::{self, ApiState};
use speedmon::config::Config;
use speedmon::dashboard::{DashboardView, SharedSnapshot};
use speedmon::oui::OuiTable;
use speedmon::poller::Poller;
use speedmon::source::CommandSource;
use speedmon::terminal;
use speedmon::view::SpeedView;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("speedmon=info")),
        )
        .init();

    let oui = match &config.oui_db {
        Some(path) => OuiTable::load(path).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "OUI table unavailable, vendors disabled");
            OuiTable::default()
        }),
        None => OuiTable::default(),
    };

    let snapshot = SharedSnapshot::new();
    let view = Arc::new(Mutex::new(SpeedView::new(DashboardView::new(snapshot.clone()), oui)));

    let server = match config.listen {
        Some(addr) => {
            let server = api::serve(
                ApiState {
                    view: view.clone(),
                    snapshot: snapshot.clone(),
                },
                addr,
            )?;
            let handle = server.handle();
            tokio::spawn(server);
            Some(handle)
        }
        None => None,
    };

    let mut poller = Poller::new(CommandSource::new(&config.stats_cmd), view.clone())
        .with_refresh(config.refresh_options());
    if !config.quiet {
        let printed = snapshot.clone();
        poller = poller.on_cycle(move || terminal::print_snapshot(&printed.read()));
    }

    tracing::info!(
        stats_cmd = %config.stats_cmd.display(),
        interval = config.interval,
        "polling host speeds"
    );
    let handle = poller.spawn(config.poll_interval());

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = running.clone();
    ctrlc::set_handler(move || running_clone.store(false, Ordering::SeqCst))?;

    while running.load(Ordering::SeqCst) && handle.is_running() {
        time::sleep(Duration::from_millis(200)).await;
    }

    tracing::info!("shutting down");
    handle.stop().await;
    if let Some(server) = server {
        server.stop(true).await;
    }
    Ok(())
}
