//! Kitty graphics output. A frame is transmitted whole the first time it is
//! placed; after that only the rectangle that changed is written into the
//! placed image's root frame.

use std::io::Write;

use anyhow::Result;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use crossterm::{
    cursor,
    terminal::{Clear, ClearType},
};
use pageview_core::{Rect, Surface};
use png::{BitDepth, ColorType, Encoder};
use tracing::trace;

use crate::frame::FrameBuffer;

const CHUNK: usize = 4096;

/// Cell area the placed image is stretched over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawParams {
    pub columns: u32,
    pub rows: u32,
}

impl DrawParams {
    pub fn clamped(columns: u32, rows: u32) -> Self {
        Self {
            columns: columns.max(1),
            rows: rows.max(1),
        }
    }
}

/// What `present` sent to the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presented {
    Unchanged,
    Full,
    /// Only this pixel rectangle was transmitted.
    Partial(Rect),
}

struct Shown {
    frame: FrameBuffer,
    params: DrawParams,
}

pub struct KittyRenderer<W: Write> {
    writer: W,
    image_id: u32,
    placement_id: u32,
    shown: Option<Shown>,
}

impl<W: Write> KittyRenderer<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            image_id: 1,
            placement_id: 1,
            shown: None,
        }
    }

    pub fn writer(&mut self) -> &mut W {
        &mut self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    /// Brings the terminal image up to date with `frame`.
    pub fn present(&mut self, frame: &FrameBuffer, params: DrawParams) -> Result<Presented> {
        if frame.width() == 0 || frame.height() == 0 {
            return Ok(Presented::Unchanged);
        }
        let changed = match &self.shown {
            Some(shown) if shown.params == params && shown.frame.size() == frame.size() => {
                match frame.diff_bounds(&shown.frame) {
                    None => return Ok(Presented::Unchanged),
                    Some(rect) => Some(rect),
                }
            }
            _ => None,
        };

        let presented = match changed {
            Some(rect) if rect.size() != frame.size() => {
                self.patch(frame, rect)?;
                Presented::Partial(rect)
            }
            _ => {
                self.transmit(frame, params)?;
                Presented::Full
            }
        };
        self.writer.flush()?;
        self.shown = Some(Shown {
            frame: frame.clone(),
            params,
        });
        Ok(presented)
    }

    /// Removes the placed image and clears the screen. The next frame is
    /// transmitted whole.
    pub fn reset(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}_Ga=d,d=I,i={},q=2\u{1b}\\", self.image_id)?;
        crossterm::execute!(
            &mut self.writer,
            Clear(ClearType::All),
            cursor::MoveTo(0, 0)
        )?;
        self.shown = None;
        Ok(())
    }

    /// Runs `f` inside a synchronized update so the terminal shows its
    /// output at once.
    pub fn synchronized<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        write!(self.writer, "\u{1b}[?2026h")?;
        let result = f(self);
        write!(self.writer, "\u{1b}[?2026l")?;
        self.writer.flush()?;
        result
    }

    fn transmit(&mut self, frame: &FrameBuffer, params: DrawParams) -> Result<()> {
        crossterm::queue!(&mut self.writer, cursor::MoveTo(0, 0))?;
        let control = format!(
            "a=T,f=100,C=1,q=2,i={},p={},c={},r={},s={},v={},z=-1",
            self.image_id,
            self.placement_id,
            params.columns,
            params.rows,
            frame.width(),
            frame.height()
        );
        self.send(&control, &encode_png(frame)?)
    }

    fn patch(&mut self, frame: &FrameBuffer, rect: Rect) -> Result<()> {
        let Some(region) = frame.crop(rect) else {
            return Ok(());
        };
        let control = format!(
            "a=f,r=1,f=100,q=2,i={},x={},y={},s={},v={}",
            self.image_id,
            rect.x,
            rect.y,
            region.width(),
            region.height()
        );
        self.send(&control, &encode_png(&region)?)
    }

    fn send(&mut self, control: &str, png: &[u8]) -> Result<()> {
        let encoded = BASE64.encode(png);
        trace!(bytes = encoded.len(), control, "sending image data");
        let mut chunks = encoded.as_bytes().chunks(CHUNK).peekable();
        let mut first = true;
        while let Some(chunk) = chunks.next() {
            let more = u8::from(chunks.peek().is_some());
            if first {
                write!(self.writer, "\u{1b}_G{},m={}", control, more)?;
                first = false;
            } else {
                write!(self.writer, "\u{1b}_Gm={},q=2", more)?;
            }
            self.writer.write_all(b";")?;
            self.writer.write_all(chunk)?;
            write!(self.writer, "\u{1b}\\")?;
        }
        Ok(())
    }
}

fn encode_png(frame: &FrameBuffer) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut encoder = Encoder::new(&mut buffer, frame.width(), frame.height());
    encoder.set_color(ColorType::Rgba);
    encoder.set_depth(BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(frame.pixels())?;
    writer.finish()?;
    Ok(buffer)
}
