use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Once;

use crossterm::terminal;

/// Set while the line editor holds the terminal in raw mode.
static EDITING: AtomicBool = AtomicBool::new(false);
static RESTORE_ON_PANIC: Once = Once::new();

/// Raw mode while a line is edited. Commands run with the terminal cooked
/// again, also when editing ends in a panic. A terminal that was already
/// raw is left that way.
pub struct RawMode {
    entered: bool,
}

impl RawMode {
    pub fn enable() -> io::Result<Self> {
        RESTORE_ON_PANIC.call_once(|| {
            let previous = std::panic::take_hook();
            std::panic::set_hook(Box::new(move |info| {
                if EDITING.swap(false, Ordering::SeqCst) {
                    let _ = terminal::disable_raw_mode();
                }
                previous(info);
            }));
        });

        if terminal::is_raw_mode_enabled()? {
            return Ok(RawMode { entered: false });
        }
        terminal::enable_raw_mode()?;
        EDITING.store(true, Ordering::SeqCst);
        Ok(RawMode { entered: true })
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        if self.entered && EDITING.swap(false, Ordering::SeqCst) {
            let _ = terminal::disable_raw_mode();
        }
    }
}
