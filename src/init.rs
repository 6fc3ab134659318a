use crate::error::InitError;
use crate::formatter::EcsFormatter;
use crate::layer::EcsLayer;
use std::io;
use tracing::Level;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Stream the layer writes to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Output {
    #[default]
    Stdout,
    Stderr,
}

/// Configuration of the ECS logging layer.
///
/// **Fields**
/// - `data_key`: nest user fields under this key (see
///   [`EcsFormatter::data_key`]).
/// - `pretty_print`: indent JSON output.
/// - `disable_html_escape`: write `<`, `>` and `&` unescaped.
/// - `report_caller`: emit `log.origin.*` for every event.
/// - `max_level`: most verbose level written.
/// - `output`: stdout or stderr.
#[derive(Clone, Debug)]
pub struct LayerConfig {
    pub data_key: Option<String>,
    pub pretty_print: bool,
    pub disable_html_escape: bool,
    pub report_caller: bool,
    pub max_level: Level,
    pub output: Output,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            data_key: None,
            pretty_print: false,
            disable_html_escape: false,
            report_caller: false,
            max_level: Level::INFO,
            output: Output::Stdout,
        }
    }
}

impl LayerConfig {
    pub fn formatter(&self) -> EcsFormatter {
        EcsFormatter {
            disable_html_escape: self.disable_html_escape,
            data_key: self.data_key.clone(),
            caller_formatter: None,
            pretty_print: self.pretty_print,
        }
    }
}

/// Build an [`EcsLayer`] from `config` without installing it.
pub fn build_layer(config: &LayerConfig) -> EcsLayer<BoxMakeWriter> {
    let writer = match config.output {
        Output::Stdout => BoxMakeWriter::new(io::stdout),
        Output::Stderr => BoxMakeWriter::new(io::stderr),
    };
    EcsLayer::new(config.formatter())
        .with_writer(writer)
        .with_report_caller(config.report_caller)
        .with_max_level(config.max_level)
}

/// Install a [`Registry`] with an [`EcsLayer`] built from `config` as the
/// global default subscriber.
///
/// Fails if a global subscriber was already set.
pub fn init_tracing_with_config(config: LayerConfig) -> Result<(), InitError> {
    let subscriber = Registry::default().with(build_layer(&config));
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Initialize tracing from the `ECS_LOG_*` environment variables.
///
/// Equivalent to calling [`init_tracing_with_config`] with
/// [`LayerConfig::from_env`].
pub fn init_tracing() -> Result<(), InitError> {
    init_tracing_with_config(LayerConfig::from_env())
}
