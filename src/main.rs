use anyhow::Result;
use tracing::{debug, info};

use local_playlist_syncer::cli::{self, Cli};
use local_playlist_syncer::config::Config;
use local_playlist_syncer::logging::{self, LogLevelResolver};

#[tokio::main]
async fn main() -> Result<()> {
    let resolver = LogLevelResolver::standard();

    // Parse command line arguments
    let cli = Cli::parse_with(&resolver);
    let config = Config::load(cli.config.as_deref())?;
    let settings = cli.into_settings(config, &resolver)?;

    // Initialize tracing
    logging::init(settings.log_level);

    info!("Starting local-playlist-syncer v{}", env!("CARGO_PKG_VERSION"));
    debug!("Settings: {:?}", settings);

    cli::run(settings).await
}
