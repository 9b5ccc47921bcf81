use std::sync::Arc;

use mnemo_service::{Clients, HealthTracker, MnemoService};

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<MnemoService>,
}
impl AppState {
	/// Connects the production backends. The returned tracker must be spawned by the caller.
	pub async fn new(config: mnemo_config::Config) -> color_eyre::Result<(Self, HealthTracker)> {
		let clients = Clients::connect(&config).await?;

		Ok(Self::with_clients(config, clients)?)
	}

	pub fn with_clients(
		config: mnemo_config::Config,
		clients: Clients,
	) -> mnemo_service::Result<(Self, HealthTracker)> {
		let (service, tracker) = MnemoService::new(config, clients)?;

		Ok((Self { service: Arc::new(service) }, tracker))
	}
}
