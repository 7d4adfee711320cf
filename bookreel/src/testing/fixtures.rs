//! Sample data for pipeline tests.

/// A valid scene analysis reply.
pub const SAMPLE_ANALYSIS_JSON: &str = r#"{
  "scene_description": "A candle-lit drawing room in a Hertfordshire manor, early nineteenth century",
  "characters": [
    {
      "name": "Elizabeth Bennet",
      "role": "main",
      "description": "A quick-witted young woman in a muslin dress",
      "first_appearance": true,
      "physical_attributes": {"hair_color": "dark brown", "age": "20", "race": null, "build": "slender"}
    },
    {
      "name": "Mrs. Bennet",
      "role": "supporting",
      "description": "An excitable mother",
      "first_appearance": true,
      "physical_attributes": {"hair_color": null, "age": "mid-forties", "race": null, "build": null}
    }
  ],
  "time_of_day": "evening",
  "weather": null,
  "mood": "playful",
  "key_elements": ["pianoforte", "embroidery hoop", "letter on a silver tray"]
}"#;

/// A short Whisper-style transcript.
pub const SAMPLE_SRT: &str = "1\n00:00:00,000 --> 00:00:03,500\nIt is a truth universally acknowledged,\n\n\
2\n00:00:03,500 --> 00:00:07,250\nthat a single man in possession of a good fortune\n\n\
3\n00:00:07,250 --> 00:00:09,000\nmust be in want of a wife.\n";

/// Text that [`FakeStudio`](super::FakeStudio) refuses to analyze.
pub const FAIL_MARKER: &str = "[unreadable]";

/// Narration that [`FakeStudio`](super::FakeStudio) cannot transcribe.
pub const INAUDIBLE_MARKER: &str = "[inaudible]";

/// Builds a book of exactly `chunk_count * chunk_size` ASCII characters.
///
/// Every chunk starts with its own chapter heading. Chunks listed in
/// `failing` also contain [`FAIL_MARKER`], so a default `FakeStudio` fails
/// their analysis.
#[must_use]
pub fn sample_book(chunk_count: usize, chunk_size: usize, failing: &[usize]) -> String {
    let marked: Vec<(usize, &str)> = failing.iter().map(|&i| (i, FAIL_MARKER)).collect();
    sample_book_with_markers(chunk_count, chunk_size, &marked)
}

/// Like [`sample_book`], but each `(index, marker)` pair starts chunk
/// `index` with `marker`.
#[must_use]
pub fn sample_book_with_markers(
    chunk_count: usize,
    chunk_size: usize,
    marked: &[(usize, &str)],
) -> String {
    (1..=chunk_count)
        .map(|index| {
            let prefix = marked
                .iter()
                .find(|(i, _)| *i == index)
                .map_or("", |(_, marker)| *marker);
            let filler = format!("Chapter {index}. It was a dark and stormy night. ");
            prefix
                .chars()
                .chain(filler.chars().cycle())
                .take(chunk_size)
                .collect::<String>()
        })
        .collect()
}
