mod config;
mod device;
mod endpoint;
mod errors;
mod metrics;
mod registry;
mod storage;
mod view;
pub mod utils;

pub use config::*;
pub use device::*;
pub use endpoint::*;
pub use errors::*;
pub use metrics::*;
pub use registry::*;
pub use storage::*;
pub use utils::*;
pub use view::*;

//-----------------------------------------------------------
// Autometrics
/// autometrics: https://docs.autometrics.dev/rust/adding-alerts-and-slos
use autometrics::objectives::Objective;
use autometrics::objectives::ObjectiveLatency;
use autometrics::objectives::ObjectivePercentile;
const API_SLO: Objective = Objective::new("api")
    .success_rate(ObjectivePercentile::P99_9)
    .latency(ObjectiveLatency::Ms10, ObjectivePercentile::P99);
