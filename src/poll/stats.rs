//! @acp:module "Poll Stats"
//! @acp:summary "Per-line answer statistics across all replies of a form"
//! @acp:domain poll
//! @acp:layer service

use std::collections::HashMap;

use serde::Serialize;
use tracing::warn;

use super::codec::{bucket_keys, decode, stats_schema, BucketKey};
use super::conditions::evaluate_reply;
use super::settings::PollSettings;
use super::tree::{build_form_tree, TreeNode};
use super::types::{Form, FormLine, FormSection, LineId, Reply, ReplyLine};

/// One aggregated bucket
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketStat {
    pub label: String,
    pub count: u64,
    pub percentage: f64,
}

/// Aggregated answers of one form line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineStats<'a> {
    pub line: &'a FormLine,
    /// Replies where the line was applicable and answered
    pub answer_count: u64,
    /// Buckets with at least one answer, most chosen first
    pub answer_stats: Vec<BucketStat>,
    /// Buckets nobody chose, in bucket order
    pub answer_zeros: Vec<BucketStat>,
}

pub type StatsNode<'a> = TreeNode<&'a FormSection, LineStats<'a>>;

/// A reply prepared for aggregation
struct IndexedReply<'r> {
    by_form_line: HashMap<LineId, &'r ReplyLine>,
    applicability: HashMap<LineId, bool>,
}

impl<'r> IndexedReply<'r> {
    fn new(reply: &'r Reply) -> Self {
        Self {
            by_form_line: reply
                .lines
                .iter()
                .filter_map(|l| l.form_line.map(|id| (id, l)))
                .collect(),
            applicability: evaluate_reply(reply),
        }
    }

    /// The counted answer for a form line, if any
    fn counted_line(&self, form_line: LineId) -> Option<&'r ReplyLine> {
        let line = self.by_form_line.get(&form_line)?;
        let live = self.applicability.get(&line.id).copied().unwrap_or(false);
        (live && line.applicable && line.is_answered()).then_some(*line)
    }
}

/// Statistics of every non-comment line of a form, in form tree order.
///
/// Replies of other forms are ignored. A reply where a line is
/// inapplicable or unanswered counts neither in that line's buckets
/// nor in its `answer_count`.
pub fn build_stats_tree<'a>(
    form: &'a Form,
    replies: &[Reply],
    settings: &PollSettings,
) -> Vec<StatsNode<'a>> {
    let indexed: Vec<IndexedReply<'_>> = replies
        .iter()
        .filter(|r| r.form == form.id)
        .map(IndexedReply::new)
        .collect();

    build_form_tree(form)
        .into_iter()
        .filter(|node| node.line().map_or(true, |l| !l.kind.is_comment()))
        .map(|node| node.map_line(|line| line_stats(line, &indexed, settings)))
        .collect()
}

fn line_stats<'a>(
    line: &'a FormLine,
    replies: &[IndexedReply<'_>],
    settings: &PollSettings,
) -> LineStats<'a> {
    let schema = stats_schema(&line.kind, &settings.labels);
    let mut buckets: Vec<(BucketKey, String, u64)> = schema
        .iter()
        .flatten()
        .map(|(key, label)| (*key, label.clone(), 0))
        .collect();
    let mut answer_count = 0;

    for reply in replies {
        let Some(reply_line) = reply.counted_line(line.id) else {
            continue;
        };
        let Some(ref raw) = reply_line.raw_answer else {
            continue;
        };
        let value = match decode(&reply_line.kind, raw) {
            Ok(value) => value,
            Err(e) => {
                warn!("Skipping undecodable answer of line {}: {}", reply_line.id, e);
                continue;
            }
        };
        // Answers on deleted choices stay in the denominator but fill no bucket
        answer_count += 1;

        if schema.is_none() {
            continue;
        }
        for key in bucket_keys(&line.kind, &value) {
            match buckets.iter_mut().find(|(k, _, _)| *k == key) {
                Some(bucket) => bucket.2 += 1,
                None => {
                    // Histogram buckets appear on first use; unknown choices are dropped
                    if let BucketKey::Value(v) = key {
                        buckets.push((key, v.to_string(), 1));
                    }
                }
            }
        }
    }

    if answer_count == 0 {
        return LineStats {
            line,
            answer_count,
            answer_stats: Vec::new(),
            answer_zeros: Vec::new(),
        };
    }

    buckets.sort_by_key(|(key, _, _)| match key {
        BucketKey::Value(v) => Some(*v),
        _ => None,
    });

    let precision = settings.stats_precision;
    let (mut answer_stats, answer_zeros): (Vec<_>, Vec<_>) = buckets
        .into_iter()
        .map(|(_, label, count)| BucketStat {
            label,
            count,
            percentage: percentage(count, answer_count, precision),
        })
        .partition(|bucket| bucket.count > 0);

    // stable: ties keep bucket order
    answer_stats.sort_by(|a, b| b.count.cmp(&a.count));

    LineStats {
        line,
        answer_count,
        answer_stats,
        answer_zeros,
    }
}

/// `round(100 * count / total, precision)`
pub fn percentage(count: u64, total: u64, precision: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let factor = 10f64.powi(precision as i32);
    (100.0 * count as f64 / total as f64 * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poll::cloner::clone_many;
    use crate::poll::fixtures::{colors_form, form_line, form_with, swallow_form};
    use crate::poll::types::{Choice, LineKind, ReplyContext};
    use crate::poll::wizard::{answer, AnswerInput};
    use serde_json::{json, Value};

    fn replies(form: &Form, answers: &[Vec<(u64, Value)>]) -> Vec<Reply> {
        let settings = PollSettings::default();
        let mut replies =
            clone_many(form, 1, answers.len(), &ReplyContext::default()).unwrap();
        for (reply, tokens) in replies.iter_mut().zip(answers) {
            for (line, token) in tokens {
                answer(reply, *line, AnswerInput::Value(token.clone()), &settings).unwrap();
            }
        }
        replies
    }

    fn lines<'a>(nodes: &'a [StatsNode<'a>]) -> Vec<&'a LineStats<'a>> {
        nodes.iter().filter_map(|n| n.line()).collect()
    }

    fn bucket(label: &str, count: u64, percentage: f64) -> BucketStat {
        BucketStat {
            label: label.to_string(),
            count,
            percentage,
        }
    }

    #[test]
    fn test_enum_or_string_other_bucket() {
        let form = colors_form();
        let replies = replies(
            &form,
            &[vec![(1, json!(1))], vec![(1, json!(2))], vec![(1, json!("Red"))]],
        );

        let nodes = build_stats_tree(&form, &replies, &PollSettings::default());
        let stats = lines(&nodes);
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].answer_count, 3);
        assert_eq!(
            stats[0].answer_stats,
            vec![
                bucket("White", 1, 33.333),
                bucket("Black", 1, 33.333),
                bucket("Other", 1, 33.333),
            ]
        );
        assert!(stats[0].answer_zeros.is_empty());
    }

    #[test]
    fn test_bool_zero_bucket_and_ranking() {
        let form = swallow_form();
        let replies = replies(
            &form,
            &[vec![(1, json!(true))], vec![(1, json!(true))], vec![]],
        );

        let nodes = build_stats_tree(&form, &replies, &PollSettings::default());
        let stats = lines(&nodes);
        assert_eq!(stats[0].answer_count, 2);
        assert_eq!(stats[0].answer_stats, vec![bucket("Yes", 2, 100.0)]);
        assert_eq!(stats[0].answer_zeros, vec![bucket("No", 0, 0.0)]);
    }

    #[test]
    fn test_inapplicable_lines_not_counted() {
        let form = swallow_form();
        let replies = replies(
            &form,
            &[
                vec![(1, json!(true)), (2, json!("Great birds"))],
                vec![(1, json!(false))],
            ],
        );

        let nodes = build_stats_tree(&form, &replies, &PollSettings::default());
        let stats = lines(&nodes);
        // free text is counted but not bucketed
        assert_eq!(stats[1].answer_count, 1);
        assert!(stats[1].answer_stats.is_empty());
        assert_eq!(stats[0].answer_count, 2);
    }

    #[test]
    fn test_skipped_and_foreign_replies_ignored() {
        let form = swallow_form();
        let mut replies = replies(&form, &[vec![(1, json!(true))]]);
        let settings = PollSettings::default();
        answer(&mut replies[0], 2, AnswerInput::NotApplicable, &settings).unwrap();

        let mut foreign = replies[0].clone();
        foreign.form = 999;
        replies.push(foreign);

        let nodes = build_stats_tree(&form, &replies, &settings);
        let stats = lines(&nodes);
        assert_eq!(stats[0].answer_count, 1);
        assert_eq!(stats[1].answer_count, 0);
        assert!(stats[1].answer_zeros.is_empty());
    }

    #[test]
    fn test_int_histogram_sorted_by_value() {
        let form = form_with(vec![form_line(1, LineKind::Hour)]);
        let replies = replies(
            &form,
            &[
                vec![(1, json!(14))],
                vec![(1, json!(9))],
                vec![(1, json!(14))],
                vec![(1, json!(20))],
            ],
        );

        let nodes = build_stats_tree(&form, &replies, &PollSettings::default());
        let stats = lines(&nodes);
        assert_eq!(
            stats[0].answer_stats,
            vec![
                bucket("14", 2, 50.0),
                bucket("9", 1, 25.0),
                bucket("20", 1, 25.0),
            ]
        );
    }

    #[test]
    fn test_multi_enum_counts_each_choice_and_drops_deleted() {
        let mut form = form_with(vec![form_line(
            1,
            LineKind::MultiEnum {
                choices: vec![
                    Choice::new(1, "Red"),
                    Choice::new(2, "Blue"),
                    Choice::new(3, "Green"),
                ],
                deleted_choices: vec![],
            },
        )]);
        let replies = replies(&form, &[vec![(1, json!([1, 2]))], vec![(1, json!([2, 3]))]]);

        // Green is deleted after the answers were given
        form.lines[0].kind = LineKind::MultiEnum {
            choices: vec![Choice::new(1, "Red"), Choice::new(2, "Blue")],
            deleted_choices: vec![Choice::new(3, "Green")],
        };

        let nodes = build_stats_tree(&form, &replies, &PollSettings::default());
        let stats = lines(&nodes);
        assert_eq!(stats[0].answer_count, 2);
        assert_eq!(
            stats[0].answer_stats,
            vec![bucket("Blue", 2, 100.0), bucket("Red", 1, 50.0)]
        );
    }

    #[test]
    fn test_deleted_enum_choice_counts_without_bucket() {
        let mut form = form_with(vec![form_line(
            1,
            LineKind::Enum {
                choices: vec![Choice::new(1, "Red"), Choice::new(2, "Blue")],
                deleted_choices: vec![],
            },
        )]);
        let replies = replies(&form, &[vec![(1, json!(1))], vec![(1, json!(2))]]);

        form.lines[0].kind = LineKind::Enum {
            choices: vec![Choice::new(1, "Red")],
            deleted_choices: vec![Choice::new(2, "Blue")],
        };

        let nodes = build_stats_tree(&form, &replies, &PollSettings::default());
        let stats = lines(&nodes);
        assert_eq!(stats[0].answer_count, 2);
        assert_eq!(stats[0].answer_stats, vec![bucket("Red", 1, 50.0)]);
        assert!(stats[0].answer_zeros.is_empty());
    }

    #[test]
    fn test_comment_lines_excluded() {
        let form = form_with(vec![form_line(1, LineKind::Comment), form_line(2, LineKind::Bool)]);
        let nodes = build_stats_tree(&form, &[], &PollSettings::default());
        let stats = lines(&nodes);
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].line.id, 2);
        assert_eq!(stats[0].answer_count, 0);
    }

    #[test]
    fn test_percentage_rounding() {
        assert_eq!(percentage(1, 3, 3), 33.333);
        assert_eq!(percentage(2, 3, 1), 66.7);
        assert_eq!(percentage(1, 0, 3), 0.0);
    }
}
