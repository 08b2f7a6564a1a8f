//! Build output written to stderr.
//!
//! Plain lines go out unstyled so that tooling can match them verbatim (cache markers, detect
//! reasons). Warnings and errors are colored line by line.

use std::io::{self, Write};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Emitted by [`Logger::cache_hit`]. Build log tooling matches on this value.
pub const CACHE_HIT_MESSAGE: &str = "***** CACHE HIT:";

/// Emitted by [`Logger::cache_miss`]. Build log tooling matches on this value.
pub const CACHE_MISS_MESSAGE: &str = "***** CACHE MISS:";

#[derive(Debug, Clone, Copy, Default)]
pub struct Logger {
    debug: bool,
}

impl Logger {
    #[must_use]
    pub fn new(debug: bool) -> Self {
        Self { debug }
    }

    #[must_use]
    pub fn debug_enabled(&self) -> bool {
        self.debug
    }

    pub fn info(&self, message: impl AsRef<str>) {
        let mut stream = io::stderr().lock();
        // Logging must never fail a build.
        let _ = writeln!(stream, "{}", message.as_ref()).and_then(|()| stream.flush());
    }

    /// Only printed when `GOOGLE_DEBUG` is enabled.
    pub fn debug(&self, message: impl AsRef<str>) {
        if self.debug {
            self.info(format!("DEBUG: {}", message.as_ref()));
        }
    }

    pub fn warning(&self, message: impl AsRef<str>) {
        let mut stream = StandardStream::stderr(ColorChoice::Auto);
        let _ = write_styled_message(
            &mut stream,
            format!("WARNING: {}", message.as_ref()),
            ColorSpec::new().set_fg(Some(Color::Yellow)),
        );
    }

    pub fn error(&self, header: impl AsRef<str>, body: impl AsRef<str>) {
        let mut stream = StandardStream::stderr(ColorChoice::Auto);
        let _ = write_styled_message(
            &mut stream,
            format!("\n[Error: {}]", header.as_ref()),
            ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true),
        )
        .and_then(|()| {
            write_styled_message(&mut stream, body, ColorSpec::new().set_fg(Some(Color::Red)))
        });
    }

    pub fn cache_hit(&self, tag: impl AsRef<str>) {
        self.info(cache_marker(CACHE_HIT_MESSAGE, tag.as_ref()));
    }

    pub fn cache_miss(&self, tag: impl AsRef<str>) {
        self.info(cache_marker(CACHE_MISS_MESSAGE, tag.as_ref()));
    }
}

fn cache_marker(marker: &str, tag: &str) -> String {
    format!("{marker} {tag:?}")
}

// Styles each line of text separately, so that when buildpack output is streamed to the
// user (and prefixes like `Step #2:` added) the line colour doesn't leak into the prefixes.
fn write_styled_message(
    stream: &mut StandardStream,
    message: impl AsRef<str>,
    spec: &ColorSpec,
) -> io::Result<()> {
    // Using `.split('\n')` rather than `.lines()` since the latter eats trailing newlines.
    for line in message.as_ref().split('\n') {
        stream.set_color(spec)?;
        write!(stream, "{line}")?;
        stream.reset()?;
        writeln!(stream)?;
    }
    stream.flush()
}
