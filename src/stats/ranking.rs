use super::badges::Badge;
use super::honor::StudentStats;
use crate::model::Student;
use std::collections::HashSet;

/// Honor-board sizes the dashboard accepts.
pub const BOARD_SIZES: [usize; 3] = [3, 5, 10];
pub const BADGE_LEADERS: usize = 3;

/// Highest `points` first; ties keep input order (`sort_by` is stable).
pub fn top_n<T, F>(items: &[T], n: usize, points: F) -> Vec<&T>
where
    F: Fn(&T) -> i64,
{
    let mut ranked: Vec<&T> = items.iter().collect();
    ranked.sort_by(|a, b| points(b).cmp(&points(a)));
    ranked.truncate(n);
    ranked
}

pub fn top_students(students: &[Student], n: usize) -> Vec<&Student> {
    top_n(students, n, |s| s.points)
}

/// Ids of the global top-`n` students by running points.
pub fn top_student_ids(students: &[Student], n: usize) -> HashSet<&str> {
    top_students(students, n)
        .into_iter()
        .map(|s| s.id.as_str())
        .collect()
}

/// Up to three holders of `badge`, highest points first.
pub fn badge_leaders(stats: &[StudentStats], badge: Badge) -> Vec<&StudentStats> {
    let holders: Vec<&StudentStats> = stats.iter().filter(|s| s.badges.contains(&badge)).collect();
    top_n(&holders, BADGE_LEADERS, |s| s.points)
        .into_iter()
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StudentStatus;

    fn student(id: &str, points: i64) -> Student {
        Student {
            id: id.into(),
            class_id: "c1".into(),
            full_name: id.to_uppercase(),
            dob: None,
            gender: None,
            status: StudentStatus::Active,
            points,
        }
    }

    fn stats(id: &str, points: i64, badges: Vec<Badge>) -> StudentStats {
        StudentStats {
            student: student(id, points),
            class_name: "5A".into(),
            points,
            total_tasks: 0,
            completed_tasks: 0,
            progress_percent: 0,
            badges,
        }
    }

    #[test]
    fn top_three_keeps_tied_students_in_input_order() {
        let students = vec![
            student("a", 20),
            student("b", 20),
            student("c", 15),
            student("d", 10),
        ];
        let ids: Vec<&str> = top_students(&students, 3).iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
    }

    #[test]
    fn ties_follow_input_order_even_when_reversed() {
        let students = vec![student("x", 5), student("y", 9), student("z", 5)];
        let ids: Vec<&str> = top_students(&students, 10).iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["y", "x", "z"]);
    }

    #[test]
    fn n_larger_than_population_returns_everyone() {
        let students = vec![student("a", 1), student("b", 2)];
        assert_eq!(top_students(&students, 5).len(), 2);
        assert!(top_students(&[], 3).is_empty());
    }

    #[test]
    fn top_ids_cover_the_podium() {
        let students = vec![
            student("a", 1),
            student("b", 7),
            student("c", 7),
            student("d", 3),
        ];
        let ids = top_student_ids(&students, 3);
        assert_eq!(ids, ["b", "c", "d"].into_iter().collect::<HashSet<_>>());
    }

    #[test]
    fn badge_leaders_filter_then_rank() {
        let all = vec![
            stats("a", 4, vec![Badge::Communicator]),
            stats("b", 30, vec![]),
            stats("c", 9, vec![Badge::Communicator, Badge::PerfectAttendance]),
            stats("d", 9, vec![Badge::Communicator]),
            stats("e", 1, vec![Badge::Communicator]),
        ];
        let ids: Vec<&str> = badge_leaders(&all, Badge::Communicator)
            .iter()
            .map(|s| s.student.id.as_str())
            .collect();
        assert_eq!(ids, ["c", "d", "a"]);
        assert!(badge_leaders(&all, Badge::VocabWarrior).is_empty());
    }
}
