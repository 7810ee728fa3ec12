//! Log excerpts around matched lines

use logtriage_core::LogLine;
use serde::Serialize;

/// One entry of an excerpt
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ExcerptItem<'a> {
    /// A shown line
    Line {
        index: usize,
        line: &'a LogLine,
        highlighted: bool,
    },

    /// A run of omitted lines
    Skipped { count: usize },
}

/// Lines within `context` of a matched line, with gaps collapsed
///
/// Without any matched line present in `log`, the first and last lines
/// serve as anchors.
pub fn excerpt<'a>(log: &'a [LogLine], matched: &[LogLine], context: usize) -> Vec<ExcerptItem<'a>> {
    let highlighted: Vec<bool> = log.iter().map(|line| matched.contains(line)).collect();
    let mut anchors: Vec<usize> = (0..log.len()).filter(|&i| highlighted[i]).collect();
    if anchors.is_empty() && !log.is_empty() {
        anchors = vec![0, log.len() - 1];
    }

    let mut out = Vec::new();
    let mut skipped = 0;
    let mut next_anchor = 0;

    for (index, line) in log.iter().enumerate() {
        while next_anchor < anchors.len() && anchors[next_anchor] + context < index {
            next_anchor += 1;
        }
        let shown = anchors
            .get(next_anchor)
            .map_or(false, |&anchor| anchor <= index + context);

        if shown {
            if skipped > 0 {
                out.push(ExcerptItem::Skipped { count: skipped });
                skipped = 0;
            }
            out.push(ExcerptItem::Line {
                index,
                line,
                highlighted: highlighted[index],
            });
        } else {
            skipped += 1;
        }
    }
    if skipped > 0 {
        out.push(ExcerptItem::Skipped { count: skipped });
    }

    out
}
