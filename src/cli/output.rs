use std::io::IsTerminal;

#[derive(Debug, Clone)]
pub struct OutputOptions {
    pub use_color: bool,
    pub verbose: bool,
    pub show_cost: bool,
}

pub fn detect_color(color_flag: bool) -> bool {
    if !color_flag {
        return false;
    }
    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }
    std::io::stdout().is_terminal()
}
