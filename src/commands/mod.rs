// Command implementations split by subcommand for clarity.
pub mod reset;
pub mod run;

pub use reset::run_reset;
pub use run::run_mode;
