pub mod console;

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub mod ata;
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub mod port;
