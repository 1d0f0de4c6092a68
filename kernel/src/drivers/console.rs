//! Service contracts for the text console, keyboard and timer.
//!
//! The console itself (VGA text buffer, cursor hardware) lives outside this
//! core; these traits are the surface the filesystem diagnostics, the shell
//! and the syscall table consume. Implementations register themselves once
//! at boot.

use spin::Once;

/// Text-mode output sink. Colors are one VGA attribute byte: 4-bit
/// foreground in the low nibble, 4-bit background in the high nibble.
pub trait Console: Send + Sync {
    fn print(&self, s: &str);
    fn print_color(&self, s: &str, color: u8);
    fn putchar(&self, c: u8);
    fn clear(&self);
    fn set_cursor(&self, x: i32, y: i32);
    fn cursor(&self) -> (i32, i32);
    fn width(&self) -> i32;
    fn height(&self) -> i32;
}

/// Blocking and non-blocking key input plus the line editor.
pub trait Keyboard: Send + Sync {
    /// Block until a key yields a character.
    fn getchar(&self) -> u8;
    /// Read an edited line; returns its length (no terminator stored).
    fn read_line(&self, buf: &mut [u8]) -> usize;
    fn key_pressed(&self) -> bool;
    /// Pending key or -1.
    fn get_key_nonblock(&self) -> i32;
}

/// Tick source used by the sleep and get_ticks syscalls.
pub trait Clock: Send + Sync {
    fn sleep_ms(&self, ms: u32);
    fn ticks(&self) -> u32;
}

static CONSOLE: Once<&'static dyn Console> = Once::new();
static KEYBOARD: Once<&'static dyn Keyboard> = Once::new();
static CLOCK: Once<&'static dyn Clock> = Once::new();

pub fn register_console(console: &'static dyn Console) {
    CONSOLE.call_once(|| console);
}

pub fn register_keyboard(keyboard: &'static dyn Keyboard) {
    KEYBOARD.call_once(|| keyboard);
}

pub fn register_clock(clock: &'static dyn Clock) {
    CLOCK.call_once(|| clock);
}

pub fn console() -> Option<&'static dyn Console> {
    CONSOLE.get().copied()
}

pub fn keyboard() -> Option<&'static dyn Keyboard> {
    KEYBOARD.get().copied()
}

pub fn clock() -> Option<&'static dyn Clock> {
    CLOCK.get().copied()
}
