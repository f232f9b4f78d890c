use super::*;

#[test]
fn empty_input_yields_no_chunks() {
    let config = ChunkingConfig::default();
    assert!(chunk_text("", &config).is_empty());
    assert!(chunk_text("   \n\t  ", &config).is_empty());
}

#[test]
fn short_text_is_a_single_chunk() {
    let config = ChunkingConfig::default();
    let chunks = chunk_text("hello world", &config);
    assert_eq!(chunks, vec!["hello world".to_string()]);
}

#[test]
fn boundaryless_text_falls_back_to_hard_cuts_with_overlap() {
    let config = ChunkingConfig {
        chunk_size: 10,
        overlap: 4,
    };
    let text: String = ('a'..='z').collect();
    let chunks = chunk_text(&text, &config);

    assert_eq!(chunks[0], "abcdefghij");
    assert_eq!(chunks[1], "ghijklmnop");
    // Each chunk repeats the last 4 chars of its predecessor.
    for pair in chunks.windows(2) {
        let tail: String = pair[0].chars().skip(pair[0].chars().count() - 4).collect();
        assert!(pair[1].starts_with(&tail));
    }
}

#[test]
fn cuts_at_a_paragraph_break_instead_of_mid_word() {
    let config = ChunkingConfig::default();
    let para_one =
        "alpha bravo charlie delta echo foxtrot golf hotel india juliet ".repeat(16);
    let para_two =
        "kilo lima mike november oscar papa quebec romeo sierra tango ".repeat(16);
    let text = format!("{para_one}\n\n{para_two}");

    let chunks = chunk_text(&text, &config);

    // The window spans into paragraph two, but the cut lands on the blank
    // line: the first chunk is exactly paragraph one, not a mid-word slice.
    assert_eq!(chunks[0], para_one.trim_end());
    assert!(chunks[0].ends_with("juliet"));
    assert!(!chunks[0].contains("kilo"));
    assert_eq!(chunks.len(), 2);
    assert!(chunks[1].contains("kilo"));
}

#[test]
fn paragraph_break_wins_over_later_word_boundaries() {
    let config = ChunkingConfig {
        chunk_size: 20,
        overlap: 2,
    };
    let chunks = chunk_text("one two\n\nthree four five six", &config);
    assert_eq!(chunks[0], "one two");
}

#[test]
fn cuts_at_a_line_break_when_no_paragraph_exists() {
    let config = ChunkingConfig {
        chunk_size: 10,
        overlap: 2,
    };
    let chunks = chunk_text("abcd efgh\nijkl mnop", &config);
    assert_eq!(chunks[0], "abcd efgh");
}

#[test]
fn cuts_after_a_sentence_when_no_line_break_exists() {
    let config = ChunkingConfig {
        chunk_size: 12,
        overlap: 2,
    };
    let chunks = chunk_text("One two. Three four. Five.", &config);
    assert_eq!(chunks[0], "One two.");
}

#[test]
fn cuts_at_a_word_boundary_as_a_last_resort() {
    let config = ChunkingConfig {
        chunk_size: 10,
        overlap: 2,
    };
    let chunks = chunk_text("alpha bravo charlie", &config);
    assert_eq!(chunks[0], "alpha");
}

#[test]
fn boundaries_inside_the_overlap_are_skipped() {
    let config = ChunkingConfig {
        chunk_size: 10,
        overlap: 4,
    };
    // The only break sits at offset 4, which the next window would swallow
    // entirely; a hard cut at the window edge keeps the chunks moving.
    let chunks = chunk_text("ab\n\ncdefghijklmno", &config);
    assert!(chunks[0].ends_with("cdefgh"));
}

#[test]
fn all_input_is_covered() {
    let config = ChunkingConfig {
        chunk_size: 7,
        overlap: 2,
    };
    let text = "the quick brown fox jumps over the lazy dog";
    let chunks = chunk_text(text, &config);

    let last = chunks.last().unwrap();
    assert!(text.ends_with(last.trim_end()));
    for chunk in &chunks {
        assert!(chunk.chars().count() <= 7);
    }
}

#[test]
fn never_splits_multibyte_characters() {
    let config = ChunkingConfig {
        chunk_size: 5,
        overlap: 1,
    };
    let text = "héllo wörld ünïcode tëxt";
    // Would panic on a byte-indexed slice through a multibyte char.
    let chunks = chunk_text(text, &config);
    assert!(!chunks.is_empty());
    for chunk in &chunks {
        assert!(chunk.chars().count() <= 5);
    }
}

#[test]
fn degenerate_overlap_still_makes_progress() {
    let config = ChunkingConfig {
        chunk_size: 4,
        overlap: 10,
    };
    let chunks = chunk_text("abcdefghij", &config);
    assert!(!chunks.is_empty());
    assert_eq!(chunks[0], "abcd");
}

#[test]
fn default_config_matches_ingestion_settings() {
    let config = ChunkingConfig::default();
    assert_eq!(config.chunk_size, 1500);
    assert_eq!(config.overlap, 200);
}
