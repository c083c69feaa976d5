use std::sync::Arc;

use crate::assets::LogoResolver;
use crate::config::AppConfig;
use crate::database::{ConnectionAccessor, Connector, PgConnector};

pub struct AppState<C: Connector = PgConnector> {
    pub db: Arc<ConnectionAccessor<C>>,
    pub config: Arc<AppConfig>,
    pub logos: Arc<LogoResolver>,
}

impl AppState<PgConnector> {
    /// Wires the production dependencies. No connection is opened here.
    pub fn from_config(config: AppConfig) -> Self {
        let connector = PgConnector::from_config(&config);
        Self::new(config, connector)
    }
}

impl<C: Connector> AppState<C> {
    pub fn new(config: AppConfig, connector: C) -> Self {
        let logos = LogoResolver::from_config(&config);
        Self {
            db: Arc::new(ConnectionAccessor::new(connector)),
            config: Arc::new(config),
            logos: Arc::new(logos),
        }
    }
}

impl<C: Connector> Clone for AppState<C> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            config: self.config.clone(),
            logos: self.logos.clone(),
        }
    }
}
