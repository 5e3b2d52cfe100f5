// frame_range.rs - parser/formatter for frame range expressions
//
// Grammar (EBNF):
//   expr  := term ("," term)*
//   term  := range | int
//   range := int "-" int ("x" int)?

use crate::error::ErrorKind;

/// Parse a frame-range expression into a sorted, deduplicated list of
/// strictly increasing frame numbers. Stepped ranges always include their
/// end bound, even if it falls off the step boundary.
pub fn parse(expr: &str) -> Result<Vec<u32>, ErrorKind> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Err(ErrorKind::InvalidFrameRange(expr.to_string()));
    }

    let mut frames: Vec<u32> = Vec::new();

    for raw_term in expr.split(',') {
        let term = raw_term.trim();
        if term.is_empty() {
            return Err(ErrorKind::InvalidFrameRange(expr.to_string()));
        }

        if let Some((range_part, step_part)) = term.split_once('x') {
            let step: u32 = step_part
                .trim()
                .parse()
                .map_err(|_| ErrorKind::InvalidFrameRange(expr.to_string()))?;
            if step == 0 {
                return Err(ErrorKind::InvalidFrameRange(expr.to_string()));
            }
            let (start, end) = parse_range(range_part.trim(), expr)?;
            let mut f = start;
            while f <= end {
                frames.push(f);
                f += step;
            }
            if frames.last() != Some(&end) {
                frames.push(end);
            }
        } else if let Some((a, b)) = term.split_once('-') {
            let (start, end) = parse_range_bounds(a, b, expr)?;
            let _ = (start, end);
            for f in start..=end {
                frames.push(f);
            }
        } else {
            let n: u32 = term
                .parse()
                .map_err(|_| ErrorKind::InvalidFrameRange(expr.to_string()))?;
            frames.push(n);
        }
    }

    frames.sort_unstable();
    frames.dedup();
    Ok(frames)
}

fn parse_range(range: &str, original: &str) -> Result<(u32, u32), ErrorKind> {
    let (a, b) = range
        .split_once('-')
        .ok_or_else(|| ErrorKind::InvalidFrameRange(original.to_string()))?;
    parse_range_bounds(a, b, original)
}

fn parse_range_bounds(a: &str, b: &str, original: &str) -> Result<(u32, u32), ErrorKind> {
    let start: u32 = a
        .trim()
        .parse()
        .map_err(|_| ErrorKind::InvalidFrameRange(original.to_string()))?;
    let end: u32 = b
        .trim()
        .parse()
        .map_err(|_| ErrorKind::InvalidFrameRange(original.to_string()))?;
    if start > end {
        return Err(ErrorKind::InvalidFrameRange(original.to_string()));
    }
    Ok((start, end))
}

/// Produce a canonical comma-separated-ranges form: consecutive runs of
/// frames collapse to `a-b`, isolated frames stay as single integers. This
/// is used both for the round-trip law and to coalesce argv frame lists for
/// command-line brevity (the renderer still receives every frame).
pub fn format(frames: &[u32]) -> String {
    if frames.is_empty() {
        return String::new();
    }

    let mut sorted = frames.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut parts = Vec::new();
    let mut run_start = sorted[0];
    let mut run_end = sorted[0];

    for &f in &sorted[1..] {
        if f == run_end + 1 {
            run_end = f;
        } else {
            parts.push(render_run(run_start, run_end));
            run_start = f;
            run_end = f;
        }
    }
    parts.push(render_run(run_start, run_end));

    parts.join(",")
}

fn render_run(start: u32, end: u32) -> String {
    if start == end {
        start.to_string()
    } else {
        format!("{}-{}", start, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_range() {
        assert_eq!(parse("1-3").unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn parses_comma_list() {
        assert_eq!(parse("1,5,10").unwrap(), vec![1, 5, 10]);
    }

    #[test]
    fn stepped_range_always_includes_end() {
        // stepped range whose last step would overshoot the declared end
        assert_eq!(
            parse("1-100x5,50,200").unwrap(),
            vec![
                1, 6, 11, 16, 21, 26, 31, 36, 41, 46, 50, 51, 56, 61, 66, 71, 76, 81, 86, 91, 96,
                100, 200
            ]
        );
    }

    #[test]
    fn stepped_range_on_boundary_does_not_duplicate_end() {
        assert_eq!(parse("1-24x2").unwrap().last(), Some(&24));
        let frames = parse("1-24x2").unwrap();
        assert_eq!(frames.iter().filter(|&&f| f == 24).count(), 1);
    }

    #[test]
    fn rejects_empty_expression() {
        assert!(parse("").is_err());
        assert!(parse("   ").is_err());
    }

    #[test]
    fn rejects_non_integer_tokens() {
        assert!(parse("a-b").is_err());
        assert!(parse("1-3x").is_err());
    }

    #[test]
    fn rejects_descending_range() {
        assert!(parse("10-1").is_err());
    }

    #[test]
    fn rejects_zero_or_negative_step() {
        assert!(parse("1-10x0").is_err());
    }

    #[test]
    fn dedups_and_sorts_overlapping_terms() {
        assert_eq!(parse("5,1-3,3").unwrap(), vec![1, 2, 3, 5]);
    }

    #[test]
    fn format_collapses_consecutive_runs() {
        assert_eq!(format(&[1, 2, 3, 5, 7, 8]), "1-3,5,7-8");
    }

    #[test]
    fn round_trip_through_format_and_parse() {
        let frames = parse("1-100x5,50,200").unwrap();
        let formatted = format(&frames);
        let reparsed = parse(&formatted).unwrap();
        assert_eq!(frames, reparsed);
    }
}
