use crate::fonts::FontBook;
use crate::model::{Line, LineRun, RunStyle, TextRun};

/// A maximal non-whitespace sequence, possibly spanning several styled runs
/// (e.g. "bold" + "," must stay together as "bold,").
struct Word {
    pieces: Vec<(String, RunStyle, f32)>,
    width: f32,
    space_before: f32,
}

fn breaks_word(ch: char) -> bool {
    ch.is_whitespace() && ch != '\u{00A0}'
}

fn split_words(runs: &[TextRun], fonts: &FontBook, font_size: f32) -> Vec<Word> {
    let mut words: Vec<Word> = Vec::new();
    let mut current: Option<Word> = None;
    let mut pending_space = 0.0_f32;

    let push_piece = |current: &mut Option<Word>, piece: &mut String, style: RunStyle, space: f32| {
        if piece.is_empty() {
            return;
        }
        let width = fonts.measure(piece, style, font_size);
        let word = current.get_or_insert_with(|| Word {
            pieces: Vec::new(),
            width: 0.0,
            space_before: space,
        });
        word.pieces.push((std::mem::take(piece), style, width));
        word.width += width;
    };

    for run in runs {
        let mut piece = String::new();
        for ch in run.text.chars() {
            if breaks_word(ch) {
                push_piece(&mut current, &mut piece, run.style, pending_space);
                if let Some(word) = current.take() {
                    words.push(word);
                }
                // the space takes the width of the run that owns it
                pending_space = fonts.space_width(run.style, font_size);
            } else {
                piece.push(ch);
            }
        }
        // a word without trailing whitespace continues into the next run
        push_piece(&mut current, &mut piece, run.style, pending_space);
    }
    if let Some(word) = current.take() {
        words.push(word);
    }
    words
}

fn finish_line(runs: &mut Vec<LineRun>, advance: f32, overflow: bool) -> Line {
    let width = runs.last().map(|r| r.x + r.width).unwrap_or(0.0);
    Line {
        runs: std::mem::take(runs),
        width,
        advance,
        overflow,
    }
}

/// Measure settings for one block.
pub(super) struct Measure {
    pub(super) font_size: f32,
    pub(super) advance: f32,
    pub(super) first_width: f32,
    pub(super) width: f32,
}

/// Greedy fill-then-break: words are added to the line until the next one
/// would pass the measure. A word is never split; one that is wider than the
/// whole measure gets a line to itself, flagged `overflow`.
pub(super) fn break_lines(
    runs: &[TextRun],
    fonts: &FontBook,
    measure: &Measure,
    source_index: usize,
) -> Vec<Line> {
    let mut lines: Vec<Line> = Vec::new();
    let mut current: Vec<LineRun> = Vec::new();
    let mut current_x = 0.0_f32;
    let mut overflow = false;

    for word in split_words(runs, fonts, measure.font_size) {
        let line_max = if lines.is_empty() {
            measure.first_width
        } else {
            measure.width
        };
        if !current.is_empty() {
            let proposed_x = current_x + word.space_before;
            if proposed_x + word.width > line_max {
                lines.push(finish_line(&mut current, measure.advance, overflow));
                current_x = 0.0;
                overflow = false;
            } else {
                current_x = proposed_x;
            }
        }

        let line_max = if lines.is_empty() {
            measure.first_width
        } else {
            measure.width
        };
        if current.is_empty() && word.width > line_max {
            let text: String = word.pieces.iter().map(|(t, _, _)| t.as_str()).collect();
            log::warn!(
                "body[{source_index}]: {text:?} is {:.1}pt wide, measure is {:.1}pt; setting it on its own line",
                word.width,
                line_max
            );
            overflow = true;
        }

        for (i, (text, style, width)) in word.pieces.into_iter().enumerate() {
            current.push(LineRun {
                text,
                style,
                font_size: measure.font_size,
                x: current_x,
                width,
                starts_word: i == 0,
            });
            current_x += width;
        }
    }

    if !current.is_empty() {
        lines.push(finish_line(&mut current, measure.advance, overflow));
    }
    lines
}
