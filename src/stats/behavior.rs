use crate::model::{Behavior, BehaviorKind};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorTotals {
    pub praise_count: usize,
    pub warn_count: usize,
    pub total_points: i64,
}

impl BehaviorTotals {
    pub fn add(&mut self, record: &Behavior) {
        match record.kind {
            BehaviorKind::Praise => self.praise_count += 1,
            BehaviorKind::Warn => self.warn_count += 1,
        }
        self.total_points += record.points;
    }

    pub fn merge(&mut self, other: BehaviorTotals) {
        self.praise_count += other.praise_count;
        self.warn_count += other.warn_count;
        self.total_points += other.total_points;
    }
}

/// Totals for one student. Period filtering is the caller's job.
pub fn aggregate_behavior<'a, I>(records: I, student_id: &str) -> BehaviorTotals
where
    I: IntoIterator<Item = &'a Behavior>,
{
    let mut totals = BehaviorTotals::default();
    for b in records.into_iter().filter(|b| b.student_id == student_id) {
        totals.add(b);
    }
    totals
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(student_id: &str, kind: BehaviorKind, points: i64) -> Behavior {
        Behavior {
            id: format!("{student_id}-{points}"),
            student_id: student_id.into(),
            date: "2024-05-06".into(),
            kind,
            points,
            content: String::new(),
        }
    }

    #[test]
    fn counts_kinds_and_sums_signed_points() {
        let records = vec![
            rec("s1", BehaviorKind::Praise, 3),
            rec("s1", BehaviorKind::Praise, 2),
            rec("s1", BehaviorKind::Warn, -1),
            rec("s1", BehaviorKind::Warn, 0),
            rec("s2", BehaviorKind::Praise, 10),
        ];
        let t = aggregate_behavior(&records, "s1");
        assert_eq!(t.praise_count, 2);
        assert_eq!(t.warn_count, 2);
        assert_eq!(t.total_points, 4);
    }

    #[test]
    fn unknown_student_yields_zero_totals() {
        let records = vec![rec("s1", BehaviorKind::Praise, 3)];
        assert_eq!(aggregate_behavior(&records, "nobody"), BehaviorTotals::default());
        assert_eq!(aggregate_behavior(&[], "s1"), BehaviorTotals::default());
    }

    #[test]
    fn merge_adds_componentwise() {
        let mut a = aggregate_behavior(&[rec("s1", BehaviorKind::Praise, 2)], "s1");
        a.merge(aggregate_behavior(&[rec("s2", BehaviorKind::Warn, -3)], "s2"));
        assert_eq!(
            a,
            BehaviorTotals {
                praise_count: 1,
                warn_count: 1,
                total_points: -1
            }
        );
    }
}
