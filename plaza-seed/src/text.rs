//! Pre-generated filler text.
//!
//! Drawing every bio and comment body fresh is the slowest part of a large
//! run, so a small pool of sentences is built once and sampled from.
//! Entries never contain tabs or newlines.

use plaza_types::TextPoolSizes;
use rand::Rng;

/// Lorem ipsum words for filler text
const LOREM_WORDS: &[&str] = &[
    "lorem", "ipsum", "dolor", "sit", "amet", "consectetur", "adipiscing", "elit",
    "sed", "do", "eiusmod", "tempor", "incididunt", "ut", "labore", "et", "dolore",
    "magna", "aliqua", "enim", "ad", "minim", "veniam", "quis", "nostrud",
    "exercitation", "ullamco", "laboris", "nisi", "aliquip", "ex", "ea", "commodo",
    "consequat", "duis", "aute", "irure", "in", "reprehenderit", "voluptate",
    "velit", "esse", "cillum", "fugiat", "nulla", "pariatur", "excepteur", "sint",
    "occaecat", "cupidatat", "non", "proident", "sunt", "culpa", "qui", "officia",
    "deserunt", "mollit", "anim", "id", "est", "laborum",
];

/// Longest entry per pool, in characters
pub const BIO_MAX_CHARS: usize = 150;
pub const POST_TEXT_MAX_CHARS: usize = 400;
pub const COMMENT_TEXT_MAX_CHARS: usize = 200;

#[derive(Debug, Clone)]
pub struct TextPool {
    entries: Vec<String>,
}

impl TextPool {
    /// Build `size` entries of at most `max_chars` characters each (at least one entry)
    pub fn generate<R: Rng + ?Sized>(rng: &mut R, size: usize, max_chars: usize) -> Self {
        let entries = (0..size.max(1))
            .map(|_| generate_text(rng, max_chars))
            .collect();
        Self { entries }
    }

    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> &str {
        &self.entries[rng.gen_range(0..self.entries.len())]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }
}

/// The three pools a run draws from.
#[derive(Debug, Clone)]
pub struct TextPools {
    pub bios: TextPool,
    pub post_texts: TextPool,
    pub comment_texts: TextPool,
}

impl TextPools {
    pub fn generate<R: Rng + ?Sized>(rng: &mut R, sizes: &TextPoolSizes) -> Self {
        Self {
            bios: TextPool::generate(rng, sizes.bios, BIO_MAX_CHARS),
            post_texts: TextPool::generate(rng, sizes.post_texts, POST_TEXT_MAX_CHARS),
            comment_texts: TextPool::generate(rng, sizes.comment_texts, COMMENT_TEXT_MAX_CHARS),
        }
    }
}

/// Sentences of lorem words, cut at a word boundary before `max_chars`.
fn generate_text<R: Rng + ?Sized>(rng: &mut R, max_chars: usize) -> String {
    let target = rng.gen_range(max_chars / 3..=max_chars.max(1));
    let mut text = String::with_capacity(target);

    while text.len() < target {
        let sentence_len = rng.gen_range(4..=12);
        let words: Vec<&str> = (0..sentence_len)
            .map(|_| LOREM_WORDS[rng.gen_range(0..LOREM_WORDS.len())])
            .collect();
        let mut sentence = words.join(" ");
        // Capitalize first letter
        if let Some(first) = sentence.get_mut(0..1) {
            first.make_ascii_uppercase();
        }
        sentence.push('.');

        let separator = usize::from(!text.is_empty());
        if text.len() + separator + sentence.len() > max_chars {
            if text.is_empty() {
                // A single sentence longer than the limit: keep whole words that fit
                for word in sentence.trim_end_matches('.').split(' ') {
                    let extra = usize::from(!text.is_empty()) + word.len();
                    if text.len() + extra > max_chars {
                        break;
                    }
                    if !text.is_empty() {
                        text.push(' ');
                    }
                    text.push_str(word);
                }
            }
            break;
        }
        if separator == 1 {
            text.push(' ');
        }
        text.push_str(&sentence);
    }

    text
}
