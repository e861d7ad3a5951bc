//! Output sanitization for raw engine transcriptions.
//!
//! Three treatments, in order: special-token markup (`<|...|>`) is stripped,
//! pathological character repetition is repaired, and every numeric
//! diagnostic is forced finite. The repetition repair is deliberately lossy:
//! a decoder stuck in a loop produces runs no natural language does, and two
//! surviving characters keep legitimate doubled letters intact.

use speech_domain::{DomainError, RawSegment, RawTranscription, TranscriptionSegment};

/// Runs of the same character at or beyond this length mark corrupt output.
const CORRUPTION_RUN_LEN: usize = 5;
/// Repair collapses runs of 3 or more down to this many characters.
const COLLAPSED_RUN_LEN: usize = 2;
/// Texts at or below this length are never scanned for repetition; short
/// fragments legitimately repeat.
const MIN_SCAN_LEN: usize = 10;

/// Remove `<|...|>` engine markup, leaving surrounding text untouched.
pub fn strip_special_tokens(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find("<|") {
        output.push_str(&rest[..open]);
        match rest[open + 2..].find("|>") {
            Some(close) => rest = &rest[open + 2 + close + 2..],
            None => {
                // Unterminated marker: keep it verbatim rather than eat text.
                output.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    output.push_str(rest);
    output
}

/// True when any character, whitespace included, repeats
/// [`CORRUPTION_RUN_LEN`] times or more in a row.
pub fn has_repetition_corruption(text: &str) -> bool {
    longest_run(text) >= CORRUPTION_RUN_LEN
}

fn longest_run(text: &str) -> usize {
    let mut longest = 0;
    let mut run = 0;
    let mut previous: Option<char> = None;
    for ch in text.chars() {
        if previous == Some(ch) {
            run += 1;
        } else {
            previous = Some(ch);
            run = 1;
        }
        longest = longest.max(run);
    }
    longest
}

/// Collapse runs of three or more identical characters to two.
pub fn collapse_repetitions(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut previous: Option<char> = None;
    let mut run = 0;
    for ch in text.chars() {
        if previous == Some(ch) {
            run += 1;
        } else {
            previous = Some(ch);
            run = 1;
        }
        if run <= COLLAPSED_RUN_LEN {
            output.push(ch);
        }
    }
    output
}

/// Non-finite values become the neutral 0.0.
pub fn scrub_non_finite(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Clean the full transcription: strip markup, repair repetition corruption,
/// scrub non-finite diagnostics.
///
/// Fails with `CorruptOutput` when the repaired text still trips the
/// repetition detector.
pub fn sanitize_transcription(
    raw: &RawTranscription,
) -> Result<(String, Vec<TranscriptionSegment>), DomainError> {
    let text = sanitize_text(&raw.text)?;
    let segments = raw
        .segments
        .iter()
        .enumerate()
        .map(|(id, segment)| sanitize_segment(id, segment))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((text, segments))
}

fn sanitize_text(text: &str) -> Result<String, DomainError> {
    let stripped = strip_special_tokens(text);
    let scan = stripped.chars().count() > MIN_SCAN_LEN;
    let cleaned = if scan && has_repetition_corruption(&stripped) {
        tracing::warn!(
            run = longest_run(&stripped),
            "repetition corruption detected, collapsing runs"
        );
        let repaired = collapse_repetitions(&stripped);
        if has_repetition_corruption(&repaired) {
            return Err(DomainError::corrupt_output(
                "repetition persists after repair",
            ));
        }
        repaired
    } else {
        stripped
    };
    Ok(cleaned.trim().to_string())
}

fn sanitize_segment(id: usize, segment: &RawSegment) -> Result<TranscriptionSegment, DomainError> {
    Ok(TranscriptionSegment {
        id,
        start_secs: scrub_non_finite(segment.start_secs),
        end_secs: scrub_non_finite(segment.end_secs),
        text: sanitize_text(&segment.text)?,
        temperature: segment.temperature,
        avg_logprob: scrub_non_finite(segment.avg_logprob),
        no_speech_prob: scrub_non_finite(segment.no_speech_prob),
        compression_ratio: scrub_non_finite(segment.compression_ratio),
        // List-valued diagnostics drop non-finite entries outright.
        token_probs: segment
            .token_probs
            .iter()
            .copied()
            .filter(|p| p.is_finite())
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_special_token_markup() {
        assert_eq!(
            strip_special_tokens("<|startoftranscript|>bonjour<|endoftext|>"),
            "bonjour"
        );
        assert_eq!(strip_special_tokens("plain text"), "plain text");
        assert_eq!(strip_special_tokens("a<|x|>b<|y|>c"), "abc");
        // Unterminated marker is preserved.
        assert_eq!(strip_special_tokens("oops <|cut"), "oops <|cut");
    }

    #[test]
    fn detects_long_character_runs() {
        assert!(!has_repetition_corruption("hello world"));
        assert!(!has_repetition_corruption("bookkeeper"));
        assert!(has_repetition_corruption("helloooooo world"));
        // Whitespace runs count like any other character.
        assert!(has_repetition_corruption("a      b"));
    }

    #[test]
    fn collapses_runs_to_two_characters() {
        assert_eq!(collapse_repetitions("helloooooo world"), "helloo world");
        assert_eq!(collapse_repetitions("aabb"), "aabb");
        assert_eq!(collapse_repetitions(""), "");
    }

    #[test]
    fn whitespace_runs_are_repaired_too() {
        let raw = RawTranscription {
            text: "bonjour      tout le monde".to_string(),
            language: None,
            segments: Vec::new(),
        };
        let (text, _) = sanitize_transcription(&raw).expect("repairable");
        assert_eq!(text, "bonjour  tout le monde");
    }

    #[test]
    fn sanitize_repairs_corrupt_text() {
        let raw = RawTranscription {
            text: "<|x|>il est laaaaaaaa".to_string(),
            language: None,
            segments: Vec::new(),
        };
        let (text, _) = sanitize_transcription(&raw).expect("repairable");
        assert_eq!(text, "il est laa");
    }

    #[test]
    fn markup_only_output_sanitizes_to_empty_text() {
        let raw = RawTranscription {
            text: "<|nospeech|>".to_string(),
            language: None,
            segments: Vec::new(),
        };
        let (text, _) = sanitize_transcription(&raw).expect("silence is not an error");
        assert!(text.is_empty());
    }

    #[test]
    fn short_fragments_are_never_scanned() {
        // 10 chars or fewer: repetition is taken at face value.
        let raw = RawTranscription {
            text: "aaaaaaa".to_string(),
            language: None,
            segments: Vec::new(),
        };
        let (text, _) = sanitize_transcription(&raw).expect("short text passes");
        assert_eq!(text, "aaaaaaa");
    }

    #[test]
    fn sanitize_accepts_genuinely_empty_input() {
        let raw = RawTranscription::default();
        let (text, segments) = sanitize_transcription(&raw).expect("empty in, empty out");
        assert!(text.is_empty());
        assert!(segments.is_empty());
    }

    #[test]
    fn segment_diagnostics_are_scrubbed() {
        let raw = RawTranscription {
            text: "ok".to_string(),
            language: None,
            segments: vec![RawSegment {
                start_secs: f64::NAN,
                end_secs: f64::INFINITY,
                text: "ok".to_string(),
                temperature: 0.0,
                avg_logprob: f64::NEG_INFINITY,
                no_speech_prob: 0.1,
                compression_ratio: 1.0,
                token_probs: vec![0.9, f32::NAN],
            }],
        };
        let (_, segments) = sanitize_transcription(&raw).expect("sanitize");
        let segment = &segments[0];
        assert_eq!(segment.start_secs, 0.0);
        assert_eq!(segment.end_secs, 0.0);
        assert_eq!(segment.avg_logprob, 0.0);
        assert_eq!(segment.no_speech_prob, 0.1);
        assert_eq!(segment.token_probs, vec![0.9]);
    }
}
