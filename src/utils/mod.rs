pub mod progress;
pub mod terminal;
pub mod user_paths;
