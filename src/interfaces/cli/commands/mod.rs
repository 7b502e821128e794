mod config_gen;
mod link;
mod sweep;

pub use config_gen::config_generate;
pub use link::{add_link, show_link};
pub use sweep::run_sweep;
