//! Chapter splitting: a heading starts a chapter.
//!
//! Blocks before the first heading form an introductory chapter titled with
//! the document title. A document with no headings is a single chapter. A
//! heading whose text is empty after normalisation gets `"Chapter N"`,
//! where `N` is the chapter's 1-based position.

use crate::model::{text_to_blocks, HeadingLevel, TextBlock};

/// One chapter of the rendered book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    pub title: String,
    /// Level of the heading that opened the chapter; `None` for the intro.
    pub level: Option<HeadingLevel>,
    /// Body blocks, heading excluded.
    pub blocks: Vec<TextBlock>,
}

impl Chapter {
    fn new(title: String, level: Option<HeadingLevel>) -> Self {
        Self {
            title,
            level,
            blocks: Vec::new(),
        }
    }
}

/// Split blocks into chapters. Always returns at least one chapter.
pub fn split_chapters(blocks: &[TextBlock], default_title: &str) -> Vec<Chapter> {
    let default_title = if default_title.trim().is_empty() {
        "Untitled"
    } else {
        default_title.trim()
    };

    let mut chapters: Vec<Chapter> = Vec::new();
    let mut current: Option<Chapter> = None;

    for block in blocks {
        match block.heading_level() {
            Some(level) => {
                if let Some(done) = current.take() {
                    chapters.push(done);
                }
                let n = chapters.len() + 1;
                let title = if block.text.trim().is_empty() {
                    format!("Chapter {n}")
                } else {
                    block.text.clone()
                };
                current = Some(Chapter::new(title, Some(level)));
            }
            None => current
                .get_or_insert_with(|| Chapter::new(default_title.to_string(), None))
                .blocks
                .push(block.clone()),
        }
    }

    if let Some(done) = current {
        chapters.push(done);
    }
    if chapters.is_empty() {
        chapters.push(Chapter::new(default_title.to_string(), None));
    }
    chapters
}

/// [`split_chapters`] over the flattened text form.
pub fn split_text_chapters(text: &str, default_title: &str) -> Vec<Chapter> {
    split_chapters(&text_to_blocks(text), default_title)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BlockKind;

    #[test]
    fn intro_then_headed_chapters() {
        let blocks = vec![
            TextBlock::paragraph("Preface."),
            TextBlock::heading(HeadingLevel::H2, "One"),
            TextBlock::paragraph("a"),
            TextBlock::paragraph("b"),
            TextBlock::heading(HeadingLevel::H2, "Two"),
            TextBlock::paragraph("c"),
        ];
        let chapters = split_chapters(&blocks, "My Book");
        let titles: Vec<_> = chapters.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["My Book", "One", "Two"]);
        assert_eq!(chapters[0].level, None);
        assert_eq!(chapters[1].blocks.len(), 2);
        assert!(chapters
            .iter()
            .flat_map(|c| &c.blocks)
            .all(|b| b.kind == BlockKind::Paragraph));
    }

    #[test]
    fn no_headings_is_one_chapter_with_everything() {
        let blocks = vec![TextBlock::paragraph("x"), TextBlock::paragraph("y")];
        let chapters = split_chapters(&blocks, "Doc");
        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].title, "Doc");
        assert_eq!(chapters[0].blocks, blocks);
    }

    #[test]
    fn empty_heading_gets_numbered_title() {
        let blocks = vec![
            TextBlock::heading(HeadingLevel::H2, "First"),
            TextBlock::heading(HeadingLevel::H2, "   "),
            TextBlock::paragraph("body"),
        ];
        let chapters = split_chapters(&blocks, "Doc");
        assert_eq!(chapters[1].title, "Chapter 2");
        assert_eq!(chapters[1].blocks.len(), 1);
    }

    #[test]
    fn empty_input_still_has_a_chapter() {
        let chapters = split_chapters(&[], "  ");
        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].title, "Untitled");
        assert!(chapters[0].blocks.is_empty());
    }

    #[test]
    fn text_form_splits_the_same_way() {
        let chapters = split_text_chapters("intro\n\n## A\n\nbody\n", "T");
        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[1].title, "A");
    }
}
