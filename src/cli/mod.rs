pub mod batch_cmd;
pub mod config_cmd;
pub mod credentials;
pub mod output;
pub mod renderer;
pub mod single_cmd;
