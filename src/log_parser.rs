// log_parser.rs - pure, stateless classification of renderer stdout lines

use crate::models::Renderer;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEvent {
    FrameStart(u32),
    FrameDone(u32),
    OutputPath(String),
    Warning(String),
    Error(String),
    Other(String),
}

/// Per-renderer substring tables used to classify a single stdout line.
/// `classify` is pure and stateless; the frame counter it feeds lives on the
/// job record, not here.
pub fn classify(renderer: Renderer, line: &str) -> LogEvent {
    if let Some(event) = classify_common(line) {
        return event;
    }
    match renderer {
        Renderer::Redshift => classify_redshift(line),
        Renderer::Arnold => classify_arnold(line),
        Renderer::Vray => classify_vray(line),
    }
    .unwrap_or_else(|| LogEvent::Other(line.to_string()))
}

fn classify_common(line: &str) -> Option<LogEvent> {
    let lower = line.to_lowercase();
    if lower.contains("license fail") || lower.contains("license error") || lower.contains("licensing") {
        return Some(LogEvent::Error(line.to_string()));
    }
    if lower.contains("scene open failed") || lower.contains("failed to open scene") {
        return Some(LogEvent::Error(line.to_string()));
    }
    if let Some(path) = extract_after(line, "Saved file:") {
        return Some(LogEvent::OutputPath(path));
    }
    if let Some(path) = extract_after(line, "Writing image:") {
        return Some(LogEvent::OutputPath(path));
    }
    if lower.contains("error:") || lower.contains(" error ") || lower.starts_with("error") {
        return Some(LogEvent::Error(line.to_string()));
    }
    if lower.contains("warning:") || lower.starts_with("warning") {
        return Some(LogEvent::Warning(line.to_string()));
    }
    None
}

fn classify_redshift(line: &str) -> Option<LogEvent> {
    if let Some(n) = extract_frame_number(line, "Rendering frame") {
        return Some(LogEvent::FrameStart(n));
    }
    if let Some(n) = extract_frame_number(line, "Frame").filter(|_| line.contains("done")) {
        return Some(LogEvent::FrameDone(n));
    }
    None
}

fn classify_arnold(line: &str) -> Option<LogEvent> {
    if let Some(n) = extract_frame_number(line, "Rendering frame") {
        return Some(LogEvent::FrameStart(n));
    }
    if let Some(n) = extract_frame_number(line, "Finished frame") {
        return Some(LogEvent::FrameDone(n));
    }
    None
}

fn classify_vray(line: &str) -> Option<LogEvent> {
    if let Some(n) = extract_frame_number(line, "Rendering frame") {
        return Some(LogEvent::FrameStart(n));
    }
    if let Some(n) = extract_frame_number(line, "Frame").filter(|_| line.contains("done")) {
        return Some(LogEvent::FrameDone(n));
    }
    None
}

fn extract_after(line: &str, marker: &str) -> Option<String> {
    line.find(marker)
        .map(|idx| line[idx + marker.len()..].trim().to_string())
        .filter(|s| !s.is_empty())
}

fn extract_frame_number(line: &str, marker: &str) -> Option<u32> {
    let idx = line.find(marker)?;
    line[idx + marker.len()..]
        .split_whitespace()
        .find_map(|tok| tok.trim_matches(|c: char| !c.is_ascii_digit()).parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_frame_start() {
        assert_eq!(
            classify(Renderer::Redshift, "Rendering frame 5"),
            LogEvent::FrameStart(5)
        );
    }

    #[test]
    fn classifies_frame_done_redshift_style() {
        assert_eq!(
            classify(Renderer::Redshift, "Frame 5 done"),
            LogEvent::FrameDone(5)
        );
    }

    #[test]
    fn classifies_frame_done_arnold_style() {
        assert_eq!(
            classify(Renderer::Arnold, "Finished frame 7"),
            LogEvent::FrameDone(7)
        );
    }

    #[test]
    fn classifies_output_path() {
        assert_eq!(
            classify(Renderer::Redshift, "Saved file: /out/BG_A.0003.exr"),
            LogEvent::OutputPath("/out/BG_A.0003.exr".to_string())
        );
    }

    #[test]
    fn classifies_license_error() {
        assert!(matches!(
            classify(Renderer::Vray, "License failed to check out"),
            LogEvent::Error(_)
        ));
    }

    #[test]
    fn falls_back_to_other() {
        assert_eq!(
            classify(Renderer::Arnold, "just some noise"),
            LogEvent::Other("just some noise".to_string())
        );
    }
}
