/// Colored, operator-facing alerts.
pub mod alerts;
/// Process-wide log dispatch setup.
pub mod loggerlocal;

pub use crate::core::pipeline::OperatorAlerts;
pub use alerts::ConsoleAlerts;
pub use loggerlocal::setup_logging;
