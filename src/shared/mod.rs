// Process-level helpers shared by the commands.
pub mod clock;
pub mod lock;
pub mod output;
pub mod params;
pub mod signal;
