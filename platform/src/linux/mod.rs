pub mod mounts;
pub mod volume;

pub use volume::{release, unmount, LinuxVolumeSource};

pub fn is_elevated() -> bool {
    nix::unistd::geteuid().is_root()
}
