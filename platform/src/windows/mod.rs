pub mod elevation;
pub mod volume;

pub use elevation::is_elevated;
pub use volume::{unmount, WindowsVolumeSource};
