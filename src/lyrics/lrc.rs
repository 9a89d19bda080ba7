//! LRC synced-lyrics parsing.
//!
//! Hand-rolled rather than pulled from a crate: the grammar is three lines
//! — a `[mm:ss.cs]` or `[mm:ss.mmm]` tag followed by text, repeated per
//! line — not worth a dependency the way the cipher blob's JS grammar was.

use crate::types::SyncedLine;

/// Parses a synced-lyrics blob into timestamp-ordered lines.
///
/// Lines carrying only metadata tags (`[ar:...]`, `[ti:...]`, ...) produce no
/// [`SyncedLine`]s, since their leading tag never parses as a timestamp.
#[must_use]
pub fn parse(input: &str) -> Vec<SyncedLine> {
    let mut lines = Vec::new();

    for raw_line in input.lines() {
        let mut rest = raw_line;
        let mut times = Vec::new();

        while let Some(open) = rest.find('[') {
            let Some(close) = rest[open..].find(']') else { break };
            let tag = &rest[open + 1..open + close];
            let Some(time_ms) = parse_timestamp(tag) else { break };
            times.push(time_ms);
            rest = &rest[open + close + 1..];
        }

        if times.is_empty() {
            continue;
        }

        let text = rest.trim().to_owned();
        for time_ms in times {
            lines.push(SyncedLine { time_ms, text: text.clone() });
        }
    }

    lines.sort_by_key(|line| line.time_ms);
    lines
}

/// Parses one `mm:ss.cs` / `mm:ss.mmm` tag into milliseconds. A two-digit
/// fractional part is centiseconds and is scaled by 10; three digits are
/// already milliseconds.
fn parse_timestamp(tag: &str) -> Option<u32> {
    let (minutes, rest) = tag.split_once(':')?;
    let (seconds, fraction) = rest.split_once('.')?;

    let minutes: u32 = minutes.trim().parse().ok()?;
    let seconds: u32 = seconds.parse().ok()?;
    let fraction_value: u32 = fraction.parse().ok()?;

    let millis = match fraction.len() {
        2 => fraction_value * 10,
        3 => fraction_value,
        _ => return None,
    };

    Some((minutes * 60 + seconds) * 1000 + millis)
}

/// Renders timestamp-ordered lines back to LRC text, one `[mm:ss.mmm]text`
/// tag per line. The inverse of [`parse`], up to the centisecond/millisecond
/// tag-width ambiguity `parse` already resolves on the way in.
#[must_use]
pub fn emit(lines: &[SyncedLine]) -> String {
    lines.iter().map(format_line).collect::<Vec<_>>().join("\n")
}

fn format_line(line: &SyncedLine) -> String {
    let minutes = line.time_ms / 60_000;
    let seconds = (line.time_ms / 1_000) % 60;
    let millis = line.time_ms % 1_000;
    format!("[{minutes:02}:{seconds:02}.{millis:03}]{}", line.text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centisecond_tag_scales_to_milliseconds() {
        let lines = parse("[00:12.34]Hello");
        assert_eq!(lines, vec![SyncedLine { time_ms: 12_340, text: "Hello".into() }]);
    }

    #[test]
    fn millisecond_tag_is_used_directly() {
        let lines = parse("[00:12.345]Hello");
        assert_eq!(lines, vec![SyncedLine { time_ms: 12_345, text: "Hello".into() }]);
    }

    #[test]
    fn multiple_timestamps_on_one_line_repeat_the_text() {
        let lines = parse("[00:01.00][00:05.00]Chorus");
        assert_eq!(
            lines,
            vec![
                SyncedLine { time_ms: 1_000, text: "Chorus".into() },
                SyncedLine { time_ms: 5_000, text: "Chorus".into() },
            ]
        );
    }

    #[test]
    fn metadata_only_lines_produce_nothing() {
        let lines = parse("[ar:Some Artist]\n[ti:Some Title]\n[00:00.00]First line");
        assert_eq!(lines, vec![SyncedLine { time_ms: 0, text: "First line".into() }]);
    }

    #[test]
    fn output_is_sorted_by_time() {
        let lines = parse("[00:05.00]Second\n[00:01.00]First");
        assert_eq!(lines[0].text, "First");
        assert_eq!(lines[1].text, "Second");
    }

    #[test]
    fn empty_input_yields_no_lines() {
        assert!(parse("").is_empty());
    }

    #[test]
    fn parse_emit_round_trips() {
        let lines = vec![
            SyncedLine { time_ms: 1_000, text: "First line".into() },
            SyncedLine { time_ms: 72_340, text: "Second line".into() },
        ];
        assert_eq!(parse(&emit(&lines)), lines);
    }

    #[test]
    fn emit_formats_millisecond_precision_tags() {
        let lines = vec![SyncedLine { time_ms: 72_340, text: "Chorus".into() }];
        assert_eq!(emit(&lines), "[01:12.340]Chorus");
    }

    #[test]
    fn emit_of_empty_lines_is_empty_string() {
        assert_eq!(emit(&[]), "");
    }
}
