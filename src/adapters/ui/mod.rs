pub mod banner;
pub mod tui;

/// Banner plus the global prompt theme. Called once from main after tracing init.
pub fn init_ui() {
    banner::print_welcome();
    tui::apply_theme();
}
