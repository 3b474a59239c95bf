//! Elastic tab stops for table output
//!
//! Text is buffered until [`Write::flush`]; every tab-terminated cell is
//! then padded to the widest cell of its column. The final cell of a line
//! is never padded, so rows carry no trailing blanks.

use std::io::{self, Write};
use unicode_width::UnicodeWidthStr;

pub const MIN_WIDTH: usize = 10;
pub const PADDING: usize = 3;

pub struct TabWriter<W: Write> {
    inner: W,
    buf: Vec<u8>,
    min_width: usize,
    padding: usize,
}

impl<W: Write> TabWriter<W> {
    pub fn new(inner: W) -> Self {
        Self::with_widths(inner, MIN_WIDTH, PADDING)
    }

    pub fn with_widths(inner: W, min_width: usize, padding: usize) -> Self {
        Self {
            inner,
            buf: Vec::new(),
            min_width,
            padding,
        }
    }

    pub fn into_inner(mut self) -> io::Result<W> {
        self.flush()?;
        Ok(self.inner)
    }

    fn render(&self) -> String {
        let text = String::from_utf8_lossy(&self.buf);
        let lines: Vec<Vec<&str>> = text
            .split_inclusive('\n')
            .map(|line| line.strip_suffix('\n').unwrap_or(line).split('\t').collect())
            .collect();

        let mut widths: Vec<usize> = Vec::new();
        for cells in &lines {
            // The last cell is not tab-terminated.
            for (i, cell) in cells.iter().take(cells.len().saturating_sub(1)).enumerate() {
                let w = (cell.width() + self.padding).max(self.min_width);
                match widths.get_mut(i) {
                    Some(current) => *current = (*current).max(w),
                    None => widths.push(w),
                }
            }
        }

        let mut out = String::with_capacity(text.len());
        let ends_with_newline = text.ends_with('\n');
        for (n, cells) in lines.iter().enumerate() {
            let last = cells.len().saturating_sub(1);
            for (i, cell) in cells.iter().enumerate() {
                out.push_str(cell);
                if i < last {
                    out.extend(std::iter::repeat(' ').take(widths[i].saturating_sub(cell.width())));
                }
            }
            if n + 1 < lines.len() || ends_with_newline {
                out.push('\n');
            }
        }
        out
    }
}

impl<W: Write> Write for TabWriter<W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.buf.is_empty() {
            let rendered = self.render();
            self.buf.clear();
            self.inner.write_all(rendered.as_bytes())?;
        }
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tabulate(input: &str) -> String {
        let mut tw = TabWriter::new(Vec::new());
        tw.write_all(input.as_bytes()).unwrap();
        String::from_utf8(tw.into_inner().unwrap()).unwrap()
    }

    #[test]
    fn test_columns_align_to_widest_cell() {
        let out = tabulate("CONTAINER ID\tIMAGE\tNAMES\nabc\tnginx:latest\tweb\n");
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "CONTAINER ID   IMAGE          NAMES");
        assert_eq!(lines[1], "abc            nginx:latest   web");
    }

    #[test]
    fn test_min_width_and_no_trailing_padding() {
        let out = tabulate("a\tb\n");
        assert_eq!(out, format!("a{}b\n", " ".repeat(9)));
    }

    #[test]
    fn test_wide_characters_measured_by_display_width() {
        let out = tabulate("名前名前名前\tx\nab\ty\n");
        let lines: Vec<&str> = out.lines().collect();
        // 12 columns of display width plus padding
        assert_eq!(lines[1], format!("ab{}y", " ".repeat(13)));
    }
}
