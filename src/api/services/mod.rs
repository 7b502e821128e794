pub mod health;
pub mod open;
pub mod redirect;

pub use health::{AppStartTime, HealthService, health_routes};
pub use open::{OpenService, open_routes};
pub use redirect::{RedirectService, redirect_routes};
