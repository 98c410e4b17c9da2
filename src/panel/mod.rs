//! Per-panel configuration: built-in presets, resolved profiles and date windows.

pub mod preset;
pub mod profile;
pub mod window;

pub use profile::{PanelProfile, QuerySpec, TokenConfig};
pub use window::DateWindow;
