//! Page dump to `readout_data.txt` / `readout_data.bin`.

use crate::buffer::PageView;
use crate::config::DumpMode;
use crate::error::Result;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Words per line in the ASCII dump.
pub const WORDS_PER_LINE: usize = 8;

/// Writes read-out pages to disk.
pub struct PageDump<W: Write> {
    mode: DumpMode,
    out: W,
    scratch: Vec<u8>,
}

impl PageDump<BufWriter<File>> {
    /// Create the dump file for `mode` in `dir`. `None` for [`DumpMode::None`].
    pub fn create(mode: DumpMode, dir: &Path) -> Result<Option<(Self, PathBuf)>> {
        let Some(name) = mode.file_name() else {
            return Ok(None);
        };
        let path = dir.join(name);
        let file = File::create(&path)?;
        tracing::info!(path = %path.display(), "dumping pages");
        Ok(Some((Self::new(mode, BufWriter::new(file)), path)))
    }
}

impl<W: Write> PageDump<W> {
    pub fn new(mode: DumpMode, out: W) -> Self {
        Self {
            mode,
            out,
            scratch: Vec::new(),
        }
    }

    /// Append one page.
    pub fn write_page(&mut self, event: u64, page: &PageView<'_>) -> Result<()> {
        match self.mode {
            DumpMode::None => {}
            DumpMode::Ascii => {
                writeln!(self.out, "Event #{event}")?;
                let words = page.len_words();
                for line_start in (0..words).step_by(WORDS_PER_LINE) {
                    for i in line_start..(line_start + WORDS_PER_LINE).min(words) {
                        write!(self.out, "{} ", page.word(i))?;
                    }
                    writeln!(self.out)?;
                }
                writeln!(self.out)?;
            }
            DumpMode::Binary => {
                self.scratch.clear();
                page.copy_to(&mut self.scratch);
                self.out.write_all(&self.scratch)?;
            }
        }
        Ok(())
    }

    /// Flush buffered output.
    pub fn finish(mut self) -> Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::DmaBuffer;

    #[test]
    fn test_ascii_format() {
        let buffer = DmaBuffer::anonymous(4096).unwrap();
        let page = buffer.view(0, 64).unwrap();
        for i in 0..16 {
            page.write_word(i, i as u32 * 10);
        }
        let mut dump = PageDump::new(DumpMode::Ascii, Vec::new());
        dump.write_page(3, &page).unwrap();
        let text = String::from_utf8(dump.finish().unwrap()).unwrap();
        assert_eq!(
            text,
            "Event #3\n0 10 20 30 40 50 60 70 \n80 90 100 110 120 130 140 150 \n\n"
        );
    }

    #[test]
    fn test_binary_is_raw_bytes() {
        let buffer = DmaBuffer::anonymous(4096).unwrap();
        let page = buffer.view(0, 8).unwrap();
        page.write_word(0, 1);
        page.write_word(1, 0xFFFF_FFFF);
        let mut dump = PageDump::new(DumpMode::Binary, Vec::new());
        dump.write_page(0, &page).unwrap();
        dump.write_page(1, &page).unwrap();
        let bytes = dump.finish().unwrap();
        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[..4], &1u32.to_ne_bytes());
    }

    #[test]
    fn test_create_none() {
        assert!(PageDump::create(DumpMode::None, Path::new("/nonexistent")).unwrap().is_none());
    }
}
