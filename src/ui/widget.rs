//! Terminal widget
//!
//! Hosts the child session's screen on the controlling terminal. Child
//! output feeds a vt100 parser; rendering replays the parsed screen onto
//! the host as escape streams, a full frame or a diff against the
//! previous frame. The widget also owns the host surface lifecycle:
//! realize claims the alternate screen and raw mode, unrealize restores
//! the host terminal and is safe to call more than once.

use std::io::{self, Write};

use crossterm::cursor::{Hide, MoveTo, Show};
use crossterm::event::{
    DisableBracketedPaste, DisableMouseCapture, EnableBracketedPaste, EnableMouseCapture,
};
use crossterm::{execute, queue};
use crossterm::style::{Attribute, ResetColor, SetAttribute};
use crossterm::terminal::{self, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen};
use portable_pty::PtySize;
use tracing::{debug, warn};

use crate::config::{scrollback_len, ColorScheme, Config};
use crate::core::session::SessionIo;
use crate::ui::dialog::ClosePrompt;

/// Terminal events the parser reports out of band: bell rings and title
/// changes land here during `process` and are drained by the widget.
#[derive(Debug, Default)]
struct TermEvents {
    bell_count: usize,
    title: String,
}

impl vt100::Callbacks for TermEvents {
    fn audible_bell(&mut self, _screen: &mut vt100::Screen) {
        self.bell_count += 1;
    }

    fn set_window_title(&mut self, _screen: &mut vt100::Screen, title: &[u8]) {
        self.title = String::from_utf8_lossy(title).into_owned();
    }
}

/// The hosted terminal screen.
pub struct TermWidget {
    parser: vt100::Parser<TermEvents>,
    io: Option<SessionIo>,
    /// Screen as of the last paint, for diff rendering.
    prev_screen: Option<vt100::Screen>,
    realized: bool,
    full_redraw: bool,
    dialog_visible: bool,
    title: String,
    bells_seen: usize,
    /// Lines scrolled back from the live view.
    view_offset: usize,
    max_scrollback: usize,
    scheme: ColorScheme,
    transparency: u8,
    font: String,
    audible_bell: bool,
}

impl TermWidget {
    pub fn new(config: &Config, rows: u16, cols: u16) -> Self {
        let max_scrollback = scrollback_len(config.scrollback);
        Self {
            parser: vt100::Parser::new_with_callbacks(
                rows,
                cols,
                max_scrollback,
                TermEvents::default(),
            ),
            io: None,
            prev_screen: None,
            realized: false,
            full_redraw: true,
            dialog_visible: false,
            title: String::new(),
            bells_seen: 0,
            view_offset: 0,
            max_scrollback,
            scheme: config.get_color_scheme(),
            transparency: config.transparency,
            font: config.font.clone(),
            audible_bell: config.audible_bell,
        }
    }

    /// Claim the host terminal: raw mode, alternate screen, mouse and
    /// bracketed paste reporting, scheme colors and font.
    pub fn realize(&mut self) -> io::Result<()> {
        if self.realized {
            return Ok(());
        }
        terminal::enable_raw_mode()?;
        // The host is raw from here on; teardown must run even when a
        // write below fails.
        self.realized = true;
        self.full_redraw = true;

        let mut stdout = io::stdout();
        self.emit_realize_sequences(&mut stdout)?;
        debug!("surface realized");
        Ok(())
    }

    fn emit_realize_sequences(&self, out: &mut impl Write) -> io::Result<()> {
        execute!(
            out,
            EnterAlternateScreen,
            EnableBracketedPaste,
            EnableMouseCapture,
            Clear(ClearType::All),
            MoveTo(0, 0)
        )?;

        write!(out, "\x1b]10;{}\x07", self.scheme.foreground.to_hex())?;
        // A translucent background is composited by the host; forcing an
        // opaque color would paint over it.
        if self.transparency == 0 {
            write!(out, "\x1b]11;{}\x07", self.scheme.background.to_hex())?;
        }
        write!(out, "\x1b]50;{}\x07", self.font)?;
        // Steady block cursor
        write!(out, "\x1b[2 q")?;
        out.flush()
    }

    /// Give the host terminal back. Idempotent; errors during teardown
    /// are ignored so cleanup always runs to the end.
    pub fn unrealize(&mut self) {
        if !self.realized {
            return;
        }
        self.realized = false;

        let mut stdout = io::stdout();
        let _ = write!(stdout, "\x1b]110\x07\x1b]111\x07");
        let _ = write!(stdout, "\x1b[0 q");
        let _ = execute!(stdout, ResetColor, SetAttribute(Attribute::Reset), Show);
        let _ = execute!(
            stdout,
            DisableMouseCapture,
            DisableBracketedPaste,
            LeaveAlternateScreen
        );
        let _ = stdout.flush();
        let _ = terminal::disable_raw_mode();
        println!();
        debug!("surface released");
    }

    /// Connect the spawned session's pty endpoints.
    pub fn attach(&mut self, io: SessionIo) {
        self.io = Some(io);
    }

    /// Drain pending child output into the parser. Returns true if any
    /// bytes arrived.
    pub fn pump_output(&mut self) -> bool {
        let mut changed = false;
        if let Some(io) = &self.io {
            while let Ok(chunk) = io.output_rx.try_recv() {
                self.parser.process(&chunk);
                changed = true;
            }
        }
        changed
    }

    /// Consume any bell the child rang since the last check, forwarding
    /// it to the host when the audible bell is enabled.
    pub fn ring_pending_bell(&mut self) -> bool {
        let bells = self.parser.callbacks().bell_count;
        if bells == self.bells_seen {
            return false;
        }
        self.bells_seen = bells;
        if self.audible_bell && self.realized {
            let mut stdout = io::stdout();
            let _ = stdout.write_all(b"\x07");
            let _ = stdout.flush();
        }
        true
    }

    /// Forward input bytes to the child. Dropped when no session is
    /// attached yet.
    pub fn write_input(&mut self, bytes: &[u8]) -> io::Result<()> {
        match &mut self.io {
            Some(io) => {
                io.writer.write_all(bytes)?;
                io.writer.flush()
            }
            None => Ok(()),
        }
    }

    /// Title reported by the child, if it changed since the last poll.
    pub fn poll_title(&mut self) -> Option<String> {
        let current = self.parser.callbacks().title.clone();
        if current != self.title {
            self.title = current;
            Some(self.title.clone())
        } else {
            None
        }
    }

    /// Paint the screen. While the close prompt is up the screen
    /// underneath stays frozen and only the overlay is repainted.
    pub fn render(&mut self) -> io::Result<()> {
        if !self.realized {
            return Ok(());
        }
        let stdout = io::stdout();
        let mut out = io::BufWriter::with_capacity(65536, stdout.lock());

        // Synchronized update (reduces flicker)
        write!(out, "\x1b[?2026h")?;

        if self.dialog_visible {
            let (rows, cols) = self.parser.screen().size();
            ClosePrompt::draw(&mut out, cols, rows, &self.scheme)?;
            queue!(out, Hide)?;
        } else {
            let screen = self.parser.screen().clone();
            match (&self.prev_screen, self.full_redraw) {
                (Some(prev), false) => out.write_all(&screen.contents_diff(prev))?,
                _ => {
                    queue!(out, Clear(ClearType::All))?;
                    out.write_all(&screen.contents_formatted())?;
                }
            }
            self.prev_screen = Some(screen);
            self.full_redraw = false;
        }

        write!(out, "\x1b[?2026l")?;
        out.flush()
    }

    /// Resize the emulated screen and the pty to match the host.
    pub fn resize(&mut self, rows: u16, cols: u16) {
        self.parser.screen_mut().set_size(rows, cols);
        if let Some(io) = &self.io {
            let size = PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            };
            if let Err(e) = io.master.resize(size) {
                warn!("pty resize failed: {}", e);
            }
        }
        self.full_redraw = true;
    }

    /// Move the view through scrollback. Positive scrolls into history,
    /// negative back toward live output. Returns the new offset.
    pub fn scroll_view(&mut self, delta: isize) -> usize {
        let next = (self.view_offset as isize).saturating_add(delta).max(0) as usize;
        self.parser
            .screen_mut()
            .set_scrollback(next.min(self.max_scrollback));
        // The parser clamps to the history it holds; adopt that value so
        // the view never parks past the end.
        self.view_offset = self.parser.screen().scrollback();
        self.view_offset
    }

    /// Jump back to live output.
    pub fn snap_to_live(&mut self) {
        if self.view_offset != 0 {
            self.view_offset = 0;
            self.parser.screen_mut().set_scrollback(0);
        }
    }

    pub fn show_close_prompt(&mut self) {
        self.dialog_visible = true;
    }

    /// Drop the prompt overlay and repaint what it covered.
    pub fn dismiss_close_prompt(&mut self) {
        self.dialog_visible = false;
        self.full_redraw = true;
    }

    /// Emulated screen, for input mode and mouse protocol queries.
    pub fn screen(&self) -> &vt100::Screen {
        self.parser.screen()
    }

    /// Plain text of the visible screen.
    pub fn visible_contents(&self) -> String {
        self.parser.screen().contents()
    }

    /// (rows, cols) of the emulated screen.
    pub fn size(&self) -> (u16, u16) {
        self.parser.screen().size()
    }

    pub fn font(&self) -> &str {
        &self.font
    }

    /// Change the host font via the xterm font control sequence.
    pub fn set_font(&mut self, desc: &str) -> io::Result<()> {
        self.font = desc.to_string();
        if self.realized {
            let mut stdout = io::stdout();
            write!(stdout, "\x1b]50;{}\x07", desc)?;
            stdout.flush()?;
        }
        Ok(())
    }

    /// Raw fd of the pty master, for foreground process queries.
    pub fn pty_fd(&self) -> Option<i32> {
        #[cfg(unix)]
        return self.io.as_ref().and_then(|io| io.master.as_raw_fd());
        #[cfg(not(unix))]
        None
    }

    /// Host terminal size as (cols, rows).
    pub fn host_size() -> io::Result<(u16, u16)> {
        terminal::size()
    }
}

impl Drop for TermWidget {
    fn drop(&mut self) {
        self.unrealize();
    }
}

#[cfg(test)]
impl TermWidget {
    fn feed(&mut self, bytes: &[u8]) {
        self.parser.process(bytes);
    }
}
