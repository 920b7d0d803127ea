//! Output formatting for query results

use crate::index::types::{Entry, EntryId};
use std::io::{self, Write};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

fn stdout(color: bool) -> StandardStream {
    let choice = if color {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    };
    StandardStream::stdout(choice)
}

/// Print entries as `id:content` with every occurrence of `keyword` highlighted
pub fn print_entries(entries: &[Entry], keyword: &str, color: bool) -> io::Result<()> {
    let mut stdout = stdout(color);

    for entry in entries {
        write_entry(&mut stdout, entry, keyword)?;
    }

    Ok(())
}

/// Print one id per line
pub fn print_ids(ids: &[EntryId]) -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    for id in ids {
        writeln!(stdout, "{}", id)?;
    }
    Ok(())
}

fn write_entry<W: WriteColor>(out: &mut W, entry: &Entry, keyword: &str) -> io::Result<()> {
    out.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
    write!(out, "{}", entry.id)?;
    out.reset()?;
    write!(out, ":")?;

    let content = entry.content.as_ref();
    let mut last = 0;
    for (start, end) in match_ranges(content, keyword) {
        write!(out, "{}", &content[last..start])?;
        out.set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true))?;
        write!(out, "{}", &content[start..end])?;
        out.reset()?;
        last = end;
    }
    writeln!(out, "{}", &content[last..])
}

/// Non-overlapping byte ranges of `keyword` in `content`
fn match_ranges(content: &str, keyword: &str) -> Vec<(usize, usize)> {
    if keyword.is_empty() {
        return Vec::new();
    }

    let finder = memchr::memmem::Finder::new(keyword.as_bytes());
    let mut ranges = Vec::new();
    let mut from = 0;
    while let Some(offset) = finder.find(&content.as_bytes()[from..]) {
        let start = from + offset;
        let end = start + keyword.len();
        ranges.push((start, end));
        from = end;
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;
    use termcolor::{Ansi, NoColor};

    #[test]
    fn test_match_ranges() {
        assert_eq!(match_ranges("red fox fox", "fox"), vec![(4, 7), (8, 11)]);
        assert_eq!(match_ranges("aaaa", "aa"), vec![(0, 2), (2, 4)]);
        assert!(match_ranges("abc", "").is_empty());
        assert!(match_ranges("abc", "z").is_empty());
    }

    #[test]
    fn test_write_entry_plain() {
        let mut out = NoColor::new(Vec::new());
        write_entry(&mut out, &Entry::new(3, "red car"), "car").unwrap();
        assert_eq!(String::from_utf8(out.into_inner()).unwrap(), "3:red car\n");
    }

    #[test]
    fn test_write_entry_highlights() {
        let mut out = Ansi::new(Vec::new());
        write_entry(&mut out, &Entry::new(1, "北京地区"), "地区").unwrap();
        let text = String::from_utf8(out.into_inner()).unwrap();

        assert!(text.contains("北京"));
        assert!(text.contains("\x1b[1m"));
        assert!(text.ends_with("\n"));
    }
}
