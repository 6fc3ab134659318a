use ecs_tracing_format::init::{init_tracing_with_config, LayerConfig};
use tracing::{error, info};

fn main() {
    let config = LayerConfig {
        data_key: Some("labels".to_string()),
        report_caller: true,
        ..LayerConfig::default()
    };
    if let Err(e) = init_tracing_with_config(config) {
        eprintln!("{}", e);
        return;
    }

    info!(user_id = 42, "starting service");

    let err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "invalid password");
    error!(error = &err as &dyn std::error::Error, user_id = 42, "authentication failed");
}
