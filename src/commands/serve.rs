use anyhow::Result;
use log::info;

use crate::context::AppContext;
use crate::server::{self, ServerConfig};

pub async fn run(app: &AppContext) -> Result<()> {
    let server_config = ServerConfig::from_env();
    info!(
        "Serving dashboard and API from {} (keystats: {})",
        server_config.bind_addr(),
        app.config().keystats_path.display()
    );
    server::serve(app.clone(), server_config).await
}
