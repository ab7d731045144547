//! Engine-independent pieces of the host capability set: import names, the
//! guest console and string decoding out of linear memory.

use tracing::info;

use crate::memory::{check_bounds, LinearMemory};
use crate::Result;

/// `console.log(offset, len)`.
pub const CONSOLE_MODULE: &str = "console";
pub const CONSOLE_LOG: &str = "log";

/// Host-allocated memory import, `js.mem`.
pub const MEMORY_MODULE: &str = "js";
pub const MEMORY_IMPORT: &str = "mem";

/// `env.malloc(size) -> offset`.
pub const ENV_MODULE: &str = "env";
pub const ENV_MALLOC: &str = "malloc";

/// Decodes `len` bytes at `offset` as UTF-8.
///
/// Invalid sequences become U+FFFD, the same way a browser `TextDecoder`
/// treats them. Out-of-bounds ranges are errors, checked before anything is
/// allocated for the copy.
pub fn read_utf8<M: LinearMemory + ?Sized>(memory: &M, offset: u32, len: u32) -> Result<String> {
    check_bounds(offset as usize, len as usize, memory.byte_len())?;
    let mut bytes = vec![0u8; len as usize];
    memory.read(offset as usize, &mut bytes)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Lines the guest has written through `console.log`.
#[derive(Debug, Default, Clone)]
pub struct Console {
    lines: Vec<String>,
}

impl Console {
    pub fn log(&mut self, line: String) {
        info!(target: "guest", "{line}");
        self.lines.push(line);
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Drops and returns everything logged so far.
    pub fn drain(&mut self) -> Vec<String> {
        std::mem::take(&mut self.lines)
    }
}
