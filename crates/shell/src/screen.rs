// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal screen backed by an avt virtual terminal with scrollback.
//!
//! This is a derived view of the raw log: viewport and scrollback reads come
//! from here, while handoff previews and driver streams read the raw log
//! directly (TUI children on the alternate screen leave scrollback empty).

/// DECSET alternate screen buffer enable.
const ALT_SCREEN_ON: &[u8] = b"\x1b[?1049h";
/// DECRST alternate screen buffer disable.
const ALT_SCREEN_OFF: &[u8] = b"\x1b[?1049l";

pub struct Screen {
    vt: avt::Vt,
    cols: u16,
    rows: u16,
    /// Lines scrolled up from the live bottom of the buffer.
    scroll_offset: usize,
    alt_screen: bool,
    seq: u64,
    changed: bool,
}

impl std::fmt::Debug for Screen {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Screen")
            .field("cols", &self.cols)
            .field("rows", &self.rows)
            .field("scroll_offset", &self.scroll_offset)
            .field("alt_screen", &self.alt_screen)
            .field("seq", &self.seq)
            .finish()
    }
}

impl Screen {
    pub fn new(cols: u16, rows: u16, scrollback_lines: usize) -> Self {
        let vt = avt::Vt::builder()
            .size(cols as usize, rows as usize)
            .scrollback_limit(scrollback_lines)
            .build();
        Self { vt, cols, rows, scroll_offset: 0, alt_screen: false, seq: 0, changed: false }
    }

    /// Feed raw PTY bytes into the virtual terminal.
    ///
    /// A bare `\n` is expanded to `\r\n` so line-feed-only streams render as
    /// line breaks rather than diagonal stairs.
    pub fn feed(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }

        if data.windows(ALT_SCREEN_ON.len()).any(|w| w == ALT_SCREEN_ON) {
            self.alt_screen = true;
        }
        if data.windows(ALT_SCREEN_OFF.len()).any(|w| w == ALT_SCREEN_OFF) {
            self.alt_screen = false;
        }

        let converted = convert_lf(data);
        let text = String::from_utf8_lossy(&converted);
        let _ = self.vt.feed_str(&text);
        self.seq += 1;
        self.changed = true;
    }

    pub fn resize(&mut self, cols: u16, rows: u16) {
        if cols == self.cols && rows == self.rows {
            return;
        }
        self.cols = cols;
        self.rows = rows;
        let _ = self.vt.resize(cols as usize, rows as usize);
        self.clamp_scroll();
        self.seq += 1;
        self.changed = true;
    }

    pub fn size(&self) -> (u16, u16) {
        (self.cols, self.rows)
    }

    /// Cursor position as 1-based (row, col), the form a DSR reply wants.
    pub fn cursor(&self) -> (usize, usize) {
        let cursor = self.vt.cursor();
        (cursor.row + 1, cursor.col + 1)
    }

    pub fn is_alt_screen(&self) -> bool {
        self.alt_screen
    }

    // -- Scrollback navigation ------------------------------------------------

    pub fn scroll_up(&mut self, n: usize) {
        self.scroll_offset = (self.scroll_offset + n).min(self.history_len());
        self.changed = true;
    }

    pub fn scroll_down(&mut self, n: usize) {
        self.scroll_offset = self.scroll_offset.saturating_sub(n);
        self.changed = true;
    }

    pub fn scroll_to_top(&mut self) {
        self.scroll_offset = self.history_len();
        self.changed = true;
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll_offset = 0;
        self.changed = true;
    }

    pub fn is_scrolled_up(&self) -> bool {
        self.scroll_offset > 0
    }

    fn history_len(&self) -> usize {
        self.vt.lines().len().saturating_sub(self.rows as usize)
    }

    fn clamp_scroll(&mut self) {
        self.scroll_offset = self.scroll_offset.min(self.history_len());
    }

    // -- Reads ----------------------------------------------------------------

    /// Exactly `rows` lines at the current scroll position.
    pub fn viewport_lines(&self, ansi: bool) -> Vec<String> {
        let all: Vec<_> = self.vt.lines().iter().collect();
        let rows = self.rows as usize;
        let offset = self.scroll_offset.min(all.len().saturating_sub(rows));
        let end = all.len() - offset;
        let start = end.saturating_sub(rows);

        let mut lines: Vec<String> = all[start..end]
            .iter()
            .copied()
            .map(|line| if ansi { line_to_ansi(line) } else { line.text().trim_end().to_owned() })
            .collect();
        while lines.len() < rows {
            lines.push(String::new());
        }
        lines
    }

    /// Last `n` non-blank-tailed lines across scrollback + viewport, bounded
    /// by a character budget that keeps the tail. Returns the lines and
    /// whether anything was cut.
    pub fn tail_lines(&self, n: usize, ansi: bool, max_chars: usize) -> (Vec<String>, bool) {
        let all: Vec<String> = self
            .vt
            .lines()
            .iter()
            .map(|line| if ansi { line_to_ansi(line) } else { line.text().trim_end().to_owned() })
            .collect();
        let last_non_empty = all.iter().rposition(|l| !l.is_empty()).map_or(0, |i| i + 1);
        let trimmed = &all[..last_non_empty];

        let start = trimmed.len().saturating_sub(n);
        let mut truncated = start > 0;
        let mut picked: Vec<String> = Vec::new();
        let mut budget = max_chars;

        for line in trimmed[start..].iter().rev() {
            let cost = line.chars().count();
            if cost <= budget {
                budget -= cost;
                picked.push(line.clone());
            } else {
                if budget > 0 {
                    // Partial fit: keep the tail of the line.
                    let skip = cost - budget;
                    picked.push(line.chars().skip(skip).collect());
                }
                truncated = true;
                break;
            }
        }

        picked.reverse();
        (picked, truncated)
    }

    // -- Change tracking (overlay render debounce) ---------------------------

    pub fn changed(&self) -> bool {
        self.changed
    }

    pub fn clear_changed(&mut self) {
        self.changed = false;
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }
}

/// Expand bare `\n` to `\r\n` without touching existing `\r\n` pairs.
fn convert_lf(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut prev = 0u8;
    for &b in data {
        if b == b'\n' && prev != b'\r' {
            out.push(b'\r');
        }
        out.push(b);
        prev = b;
    }
    out
}

// -- ANSI re-emission ---------------------------------------------------------

const SGR_RESET: &str = "\x1b[0m";

/// SGR base for foreground colors; background adds 10.
const FG_BASE: u8 = 30;
const BG_BASE: u8 = 40;

/// Pen attributes and the SGR code each one re-emits as.
const PEN_ATTRS: [(fn(&avt::Pen) -> bool, u8); 7] = [
    (avt::Pen::is_bold, 1),
    (avt::Pen::is_faint, 2),
    (avt::Pen::is_italic, 3),
    (avt::Pen::is_underline, 4),
    (avt::Pen::is_blink, 5),
    (avt::Pen::is_inverse, 7),
    (avt::Pen::is_strikethrough, 9),
];

/// SGR parameter fragment for one color: named (30-37/40-47), bright
/// (90-97/100-107), indexed (`38;5;n`), or truecolor (`38;2;r;g;b`).
fn color_param(color: avt::Color, base: u8) -> String {
    match color {
        avt::Color::Indexed(n) if n < 8 => (base + n).to_string(),
        avt::Color::Indexed(n) if n < 16 => (base + 60 + (n - 8)).to_string(),
        avt::Color::Indexed(n) => format!("{};5;{n}", base + 8),
        avt::Color::RGB(c) => format!("{};2;{};{};{}", base + 8, c.r, c.g, c.b),
    }
}

/// Full reset-and-set sequence for a non-default pen, as a joined
/// parameter list (`ESC[0;<color>;<attrs>m`).
fn sgr_for(pen: &avt::Pen) -> String {
    let mut params = vec!["0".to_owned()];
    if let Some(color) = pen.foreground() {
        params.push(color_param(color, FG_BASE));
    }
    if let Some(color) = pen.background() {
        params.push(color_param(color, BG_BASE));
    }
    for (is_set, code) in PEN_ATTRS {
        if is_set(pen) {
            params.push(code.to_string());
        }
    }
    format!("\x1b[{}m", params.join(";"))
}

/// Re-emit one rendered line with SGR escapes derived from its pens,
/// switching style at every pen boundary and resetting at the end.
fn line_to_ansi(line: &avt::Line) -> String {
    let mut out = String::new();
    let mut open = false;

    for cells in line.chunks(|a, b| a.pen() != b.pen()) {
        let pen = cells[0].pen();
        if pen.is_default() {
            if open {
                out.push_str(SGR_RESET);
                open = false;
            }
        } else {
            out.push_str(&sgr_for(pen));
            open = true;
        }
        out.extend(cells.iter().map(|cell| cell.char()));
    }

    if open {
        out.push_str(SGR_RESET);
    }
    out.truncate(out.trim_end().len());
    out
}

#[cfg(test)]
#[path = "screen_tests.rs"]
mod tests;
