//! Applies watched configuration changes until shutdown.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};

use crate::config::GatewayConfig;
use crate::gateway::GatewayController;

pub async fn apply_config_updates(
    gateway: Arc<GatewayController>,
    mut updates: mpsc::UnboundedReceiver<GatewayConfig>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            update = updates.recv() => {
                let Some(config) = update else {
                    tracing::debug!("Config update channel closed");
                    return;
                };
                if let Err(e) = gateway.reconfigure(config) {
                    tracing::error!(error = %e, "Rejected configuration, keeping current services");
                }
            }
            _ = shutdown.recv() => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Protocol, ServiceConfig};
    use crate::gateway::GatewaySettings;
    use crate::lifecycle::Shutdown;
    use crate::services::{ProcessXsltTransformer, StaticBackends, StylesheetCache, Transformations};

    #[tokio::test]
    async fn test_updates_swap_registry() {
        let transformations = Arc::new(Transformations::new(
            StylesheetCache::new("/"),
            Arc::new(ProcessXsltTransformer::new(None)),
        ));
        let gateway = Arc::new(
            GatewayController::new(
                GatewaySettings::new(GatewayConfig::default(), "/"),
                Arc::new(StaticBackends::new("/")),
                transformations,
            )
            .unwrap(),
        );
        let shutdown = Shutdown::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(apply_config_updates(gateway.clone(), rx, shutdown.subscribe()));

        let mut config = GatewayConfig::default();
        config.services.push(ServiceConfig::new(Protocol::Wfs));
        tx.send(config).unwrap();
        // duplicate names are rejected and leave the previous registry in place
        let mut broken = GatewayConfig::default();
        broken.services = vec![ServiceConfig::new(Protocol::Wms), ServiceConfig::new(Protocol::Wms)];
        tx.send(broken).unwrap();
        drop(tx);
        task.await.unwrap();

        assert_eq!(gateway.registry().load().names(), vec!["WFS".to_string()]);
        assert_eq!(gateway.settings().config.services.len(), 1);
    }
}
