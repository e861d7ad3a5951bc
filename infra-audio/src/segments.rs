//! Merging of voice-activity intervals.

/// Half-open `[start, end)` sample interval classified as speech.
pub type VoiceSegment = (usize, usize);

/// Merge nearby intervals in one left-to-right pass.
///
/// Input must already be sorted ascending by start (the VAD emits frames in
/// order). An interval whose start lies within `max_gap` of the previous
/// merged interval's end extends it; otherwise it opens a new one.
pub fn merge_segments(segments: &[VoiceSegment], max_gap: usize) -> Vec<VoiceSegment> {
    let Some((first, rest)) = segments.split_first() else {
        return Vec::new();
    };

    let mut merged = vec![*first];
    for &(start, end) in rest {
        let last = merged.last_mut().expect("merged is never empty here");
        if start.saturating_sub(last.1) <= max_gap {
            last.1 = last.1.max(end);
        } else {
            merged.push((start, end));
        }
    }
    merged
}
