// src/tasks/mod.rs

//! Concrete AWS-style resource tasks.

pub mod fingerprint;
pub mod instance;
pub mod sshkey;
pub mod subnet;
pub mod vpc;

pub use instance::Instance;
pub use sshkey::SshKey;
pub use subnet::Subnet;
pub use vpc::Vpc;
