#![no_std]

//! Guest module for the harness. Build with
//! `cargo build -p memlens-guest --target wasm32-unknown-unknown --release`
//! and load the resulting `memlens_guest.wasm` with `memlens-demo`.
//!
//! The linker exports the module's own memory as `memory`, so this guest is
//! the exported-memory variant.

#[cfg(target_arch = "wasm32")]
mod host {
    #[link(wasm_import_module = "console")]
    extern "C" {
        pub fn log(offset: u32, len: u32);
    }

    #[link(wasm_import_module = "math")]
    extern "C" {
        pub fn add(a: i32, b: i32) -> i32;
        pub fn lt(a: i32, b: i32) -> i32;
    }
}

/// Written to the console by `main`.
pub static GREETING: &str = "Hello from the memlens guest";

#[cfg(target_arch = "wasm32")]
fn log_str(text: &str) {
    unsafe { host::log(text.as_ptr() as u32, text.len() as u32) }
}

/// Entry point run by the host right after instantiation.
#[cfg(target_arch = "wasm32")]
#[no_mangle]
pub extern "C" fn main() {
    log_str(GREETING);
}

/// Logs `len` bytes of linear memory starting at `offset`.
#[cfg(target_arch = "wasm32")]
#[no_mangle]
pub extern "C" fn print(offset: u32, len: u32) {
    unsafe { host::log(offset, len) }
}

/// Sums `1..=n` using the host's arithmetic.
#[cfg(target_arch = "wasm32")]
#[no_mangle]
pub extern "C" fn triangle(n: i32) -> i32 {
    let mut total = 0;
    let mut i = 1;
    unsafe {
        while host::lt(n, i) == 0 {
            total = host::add(total, i);
            i = host::add(i, 1);
        }
    }
    total
}

/// Abort-on-panic for no_std wasm builds.
#[cfg_attr(not(test), panic_handler)]
fn panic(_: &core::panic::PanicInfo) -> ! {
    loop {}
}
