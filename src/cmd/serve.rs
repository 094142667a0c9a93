use anyhow::Result;

use stagebot::config::Config;
use stagebot::server;

pub async fn cmd_serve(mut config: Config, port: Option<u16>) -> Result<()> {
    if let Some(port) = port {
        config.server.port = port;
    }
    server::start_server(config).await
}
