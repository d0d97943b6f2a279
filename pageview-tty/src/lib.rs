//! Terminal front end: frame buffer, kitty graphics output and input mapping.

use std::io::{self, Write};

mod frame;
mod input;
mod kitty;

pub use frame::FrameBuffer;
pub use input::{CellMetrics, EventMapper, InputMode, PointerInput, UiEvent};
pub use kitty::{DrawParams, KittyRenderer, Presented};

pub fn write_status_line<W: Write>(writer: &mut W, label: &str) -> io::Result<()> {
    write!(writer, "{}", label)?;
    writer.flush()
}
